//! bugtrack-health — periodic endpoint health checks with batched alerting.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── run_cycle()
//!   │   ├── Prober::probe() per endpoint, all concurrently → ProbeResult
//!   │   └── unhealthy results (config order) → AlertBatch → AlertSink::send()
//!   └── start() → MonitorHandle
//!       ├── first cycle immediately, then every `interval`
//!       └── stop() signals shutdown and awaits the in-flight cycle
//! ```
//!
//! Probes never fail: network errors, timeouts and 5xx responses all become
//! unhealthy `ProbeResult`s. Alert delivery is best-effort and only logged
//! on failure.

pub mod alert;
pub mod checker;
pub mod monitor;

pub use alert::{AlertBatch, AlertSink, WebhookAlertSink};
pub use checker::{Endpoint, HttpProber, ProbeOutcome, ProbeResult, ProbeStatus, Prober};
pub use monitor::{CycleReport, HealthMonitor, MonitorHandle};
