//! Error reporting sink.
//!
//! Operations that are about to surface a fatal failure hand it to an
//! `ErrorReporter` first. The default `TracingReporter` writes a structured
//! `error!` event tagged with the deployment environment and release; other
//! reporters (an error-tracking service client, a test recorder) plug in
//! behind the same trait.

use std::error::Error;
use std::fmt;

use tracing::{error, info, warn};

use crate::config::ReportingConfig;

/// Severity for free-form messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => f.write_str("info"),
            Level::Warning => f.write_str("warning"),
            Level::Error => f.write_str("error"),
        }
    }
}

/// Where a reported error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Operation name, e.g. `backup.create`.
    pub operation: &'static str,
    /// What the operation was acting on (a path, a URL, an endpoint name).
    pub target: String,
}

impl ErrorContext {
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
        }
    }
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &(dyn Error + 'static), context: &ErrorContext);

    fn capture_message(&self, message: &str, level: Level);
}

/// Reporter that writes through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingReporter {
    environment: String,
    release: String,
}

impl TracingReporter {
    pub fn new(config: &ReportingConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            release: config.release.clone(),
        }
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new(&ReportingConfig::default())
    }
}

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &(dyn Error + 'static), context: &ErrorContext) {
        error!(
            operation = context.operation,
            subject = %context.target,
            environment = %self.environment,
            release = %self.release,
            error = %error_chain(err),
            "error captured"
        );
    }

    fn capture_message(&self, message: &str, level: Level) {
        match level {
            Level::Info => info!(environment = %self.environment, "{message}"),
            Level::Warning => warn!(environment = %self.environment, "{message}"),
            Level::Error => error!(environment = %self.environment, "{message}"),
        }
    }
}

/// Join an error and its sources into one line: `outer: inner: root`.
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("dump failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn error_chain_walks_sources() {
        let err = Outer(std::io::Error::other("disk full"));
        assert_eq!(error_chain(&err), "dump failed: disk full");
    }

    #[test]
    fn tracing_reporter_takes_reporting_tags() {
        let reporter = TracingReporter::new(&ReportingConfig {
            environment: "production".to_string(),
            release: "2.1.0".to_string(),
        });
        assert_eq!(reporter.environment, "production");
        assert_eq!(reporter.release, "2.1.0");
        reporter.report(
            &std::io::Error::other("boom"),
            &ErrorContext::new("backup.create", "backups/"),
        );
        reporter.capture_message("backup created", Level::Info);
    }

    #[test]
    fn level_display() {
        assert_eq!(Level::Warning.to_string(), "warning");
    }
}
