//! Alert delivery for unhealthy probe results.
//!
//! One cycle produces at most one alert: every unhealthy endpoint becomes an
//! attachment of a single chat-webhook message.

use std::future::Future;
use std::time::Duration;

use bugtrack_core::config::DEFAULT_ALERT_TIMEOUT_MS;
use bugtrack_core::{error_chain, iso8601};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::checker::ProbeResult;

/// The unhealthy results of one cycle, in endpoint configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertBatch {
    unhealthy: Vec<ProbeResult>,
    created_at: DateTime<Utc>,
}

impl AlertBatch {
    /// Build a batch from the unhealthy results of a cycle. Returns `None`
    /// when there is nothing to alert on.
    pub fn new(unhealthy: Vec<ProbeResult>, created_at: DateTime<Utc>) -> Option<Self> {
        if unhealthy.is_empty() {
            return None;
        }
        Some(Self {
            unhealthy,
            created_at,
        })
    }

    pub fn unhealthy(&self) -> &[ProbeResult] {
        &self.unhealthy
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.unhealthy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unhealthy.is_empty()
    }

    /// Render the batch as a chat-webhook message.
    pub fn to_message(&self) -> WebhookMessage {
        WebhookMessage {
            text: format!(
                "🚨 Health Check Alert - {} service(s) down",
                self.unhealthy.len()
            ),
            attachments: self
                .unhealthy
                .iter()
                .map(|result| Attachment {
                    color: "danger",
                    fields: vec![
                        Field {
                            title: "Service",
                            value: result.endpoint_name.clone(),
                            short: true,
                        },
                        Field {
                            title: "Error",
                            value: result.error_message().unwrap_or_default().to_string(),
                            short: false,
                        },
                        Field {
                            title: "Time",
                            value: iso8601(result.timestamp),
                            short: true,
                        },
                    ],
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: &'static str,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub title: &'static str,
    pub value: String,
    pub short: bool,
}

/// Destination for alert batches.
///
/// Delivery is best-effort: implementations log failures and never return
/// them, so a broken alert channel cannot stop the monitor.
pub trait AlertSink: Send + Sync {
    fn send(&self, batch: &AlertBatch) -> impl Future<Output = ()> + Send;
}

/// Posts alert batches to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_millis(DEFAULT_ALERT_TIMEOUT_MS))
    }

    /// A sink whose deliveries are abandoned after `timeout`.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "alert client unavailable, using defaults");
                reqwest::Client::new()
            });
        Self::with_client(client, url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AlertSink for WebhookAlertSink {
    async fn send(&self, batch: &AlertBatch) {
        let message = batch.to_message();
        match self.client.post(&self.url).json(&message).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(services = batch.len(), "alert delivered");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), url = %self.url, "alert webhook rejected message");
            }
            Err(e) => {
                error!(error = %error_chain(&e), url = %self.url, "failed to send alert");
            }
        }
    }
}
