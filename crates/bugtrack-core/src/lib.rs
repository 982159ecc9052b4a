//! bugtrack-core — shared building blocks for the bugtrack operational tools.
//!
//! - **`config`** — `OpsConfig` loaded from `bugtrack-ops.toml` plus
//!   environment overrides
//! - **`clock`** — injectable wall clock and ISO8601 rendering
//! - **`report`** — the error-report sink used before fatal failures propagate

pub mod clock;
pub mod config;
pub mod report;

pub use clock::{Clock, FixedClock, SystemClock, iso8601};
pub use config::{
    BackupConfig, ConfigError, EndpointConfig, MonitorConfig, OpsConfig, ReportingConfig,
    RetentionOrder,
};
pub use report::{ErrorContext, ErrorReporter, Level, TracingReporter, error_chain};
