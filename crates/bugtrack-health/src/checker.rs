//! Endpoint probe logic.
//!
//! A probe issues one bounded `GET` against an endpoint and classifies the
//! outcome. Any response below 500 means the service is up (even if it
//! answered with an error page); 5xx, connection failures and timeouts mean
//! it is not.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bugtrack_core::{Clock, EndpointConfig, SystemClock, error_chain, iso8601};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

const USER_AGENT: &str = concat!("bugtrack-health/", env!("CARGO_PKG_VERSION"));

/// A named URL to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    /// Bound for a single probe, not for the whole cycle.
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout,
        }
    }
}

impl From<&EndpointConfig> for Endpoint {
    fn from(config: &EndpointConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.url.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
}

/// What a probe observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// The endpoint answered with a status below 500.
    Healthy {
        #[serde(rename = "responseTime")]
        response_time_ms: u64,
        #[serde(rename = "statusCode")]
        status_code: u16,
    },
    /// 5xx, connection failure, or timeout.
    Unhealthy { error: String },
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "name")]
    pub endpoint_name: String,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn healthy(
        endpoint_name: impl Into<String>,
        response_time_ms: u64,
        status_code: u16,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            outcome: ProbeOutcome::Healthy {
                response_time_ms,
                status_code,
            },
            timestamp,
        }
    }

    pub fn unhealthy(
        endpoint_name: impl Into<String>,
        error: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            outcome: ProbeOutcome::Unhealthy {
                error: error.into(),
            },
            timestamp,
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match self.outcome {
            ProbeOutcome::Healthy { .. } => ProbeStatus::Healthy,
            ProbeOutcome::Unhealthy { .. } => ProbeStatus::Unhealthy,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == ProbeStatus::Healthy
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        match self.outcome {
            ProbeOutcome::Healthy {
                response_time_ms, ..
            } => Some(response_time_ms),
            ProbeOutcome::Unhealthy { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.outcome {
            ProbeOutcome::Healthy { status_code, .. } => Some(status_code),
            ProbeOutcome::Unhealthy { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            ProbeOutcome::Healthy { .. } => None,
            ProbeOutcome::Unhealthy { error } => Some(error),
        }
    }
}

fn serialize_instant<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&iso8601(*at))
}

/// Something that can check one endpoint.
///
/// Implementations must always resolve to a `ProbeResult`; failures are
/// captured in the result, never propagated.
pub trait Prober: Send + Sync {
    fn probe(&self, endpoint: &Endpoint) -> impl Future<Output = ProbeResult> + Send;
}

/// Probes endpoints over HTTP(S) with `reqwest`.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl HttpProber {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                debug!(error = %e, "custom probe client unavailable, using defaults");
                reqwest::Client::new()
            });
        Self::with_client(client, clock)
    }

    pub fn with_client(client: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeResult {
        let started = Instant::now();
        let response = self
            .client
            .get(&endpoint.url)
            .timeout(endpoint.timeout)
            .send()
            .await;

        let outcome = match response {
            Ok(resp) => {
                let elapsed = started.elapsed().as_millis() as u64;
                classify_status(resp.status().as_u16(), elapsed)
            }
            Err(e) => ProbeOutcome::Unhealthy {
                error: describe_error(&e, endpoint.timeout),
            },
        };

        match &outcome {
            ProbeOutcome::Healthy {
                response_time_ms,
                status_code,
            } => {
                debug!(endpoint = %endpoint.name, status = status_code, latency_ms = response_time_ms, "probe healthy");
            }
            ProbeOutcome::Unhealthy { error } => {
                debug!(endpoint = %endpoint.name, url = %endpoint.url, %error, "probe unhealthy");
            }
        }

        ProbeResult {
            endpoint_name: endpoint.name.clone(),
            outcome,
            timestamp: self.clock.now(),
        }
    }
}

/// Classify an HTTP status code: anything below 500 is reachable.
pub fn classify_status(status_code: u16, response_time_ms: u64) -> ProbeOutcome {
    if status_code < 500 {
        ProbeOutcome::Healthy {
            response_time_ms,
            status_code,
        }
    } else {
        ProbeOutcome::Unhealthy {
            error: format!("request failed with status code {status_code}"),
        }
    }
}

fn describe_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("timeout of {}ms exceeded", timeout.as_millis())
    } else if err.is_connect() {
        format!("connection failed: {}", error_chain(err))
    } else {
        error_chain(err)
    }
}
