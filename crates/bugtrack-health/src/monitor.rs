//! Health monitor — runs probe cycles on a fixed interval.
//!
//! Each cycle probes every configured endpoint concurrently, waits for all
//! of them, and hands the unhealthy ones to the alert sink as one batch.
//! `start()` moves the monitor onto a background task; the returned
//! `MonitorHandle` stops it and exposes the latest complete cycle.

use std::sync::Arc;
use std::time::Duration;

use bugtrack_core::{Clock, ConfigError, MonitorConfig, SystemClock};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertBatch, AlertSink, WebhookAlertSink};
use crate::checker::{Endpoint, HttpProber, ProbeResult, Prober};

/// Outcome of one monitoring cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// One result per configured endpoint, in configuration order.
    pub results: Vec<ProbeResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether an alert batch was handed to the sink.
    pub alerted: bool,
}

impl CycleReport {
    pub fn healthy(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.is_healthy())
    }

    pub fn unhealthy(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| !r.is_healthy())
    }

    pub fn all_healthy(&self) -> bool {
        self.results.iter().all(ProbeResult::is_healthy)
    }
}

/// Periodic checker over a fixed endpoint set.
pub struct HealthMonitor<P = HttpProber, A = WebhookAlertSink> {
    endpoints: Vec<Endpoint>,
    interval: Duration,
    prober: P,
    /// `None` disables alerting; cycles still report results.
    sink: Option<A>,
    clock: Arc<dyn Clock>,
}

impl HealthMonitor<HttpProber, WebhookAlertSink> {
    /// Build a monitor with the HTTP prober and, when a webhook URL is
    /// configured, the webhook alert sink.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sink = config
            .webhook_url
            .as_deref()
            .map(|url| WebhookAlertSink::with_timeout(url, config.alert_timeout()));
        Ok(Self::new(config, HttpProber::new(clock.clone()), sink)?.with_clock(clock))
    }
}

impl<P: Prober, A: AlertSink> HealthMonitor<P, A> {
    pub fn new(config: &MonitorConfig, prober: P, sink: Option<A>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            endpoints: config.endpoints.iter().map(Endpoint::from).collect(),
            interval: config.interval(),
            prober,
            sink,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used for cycle and alert timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn alerting_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Probe every endpoint concurrently and alert on the unhealthy ones.
    ///
    /// Returns the full result set whether or not an alert was sent.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = self.clock.now();
        debug!(endpoints = self.endpoints.len(), "probing endpoints");

        let results = join_all(self.endpoints.iter().map(|e| self.prober.probe(e))).await;

        let unhealthy: Vec<ProbeResult> =
            results.iter().filter(|r| !r.is_healthy()).cloned().collect();

        let mut alerted = false;
        match (&self.sink, AlertBatch::new(unhealthy, self.clock.now())) {
            (Some(sink), Some(batch)) => {
                sink.send(&batch).await;
                alerted = true;
            }
            (None, Some(batch)) => {
                debug!(unhealthy = batch.len(), "alerting disabled, skipping alert");
            }
            (_, None) => {}
        }

        CycleReport {
            results,
            started_at,
            finished_at: self.clock.now(),
            alerted,
        }
    }
}

impl<P, A> HealthMonitor<P, A>
where
    P: Prober + 'static,
    A: AlertSink + 'static,
{
    /// Run one cycle now, then one every `interval`, on a background task.
    ///
    /// A cycle that overruns the interval causes the missed ticks to be
    /// skipped, so cycles never overlap. Dropping the handle without
    /// calling `stop()` also ends the schedule.
    pub fn start(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (report_tx, report_rx) = watch::channel(None);

        info!(
            endpoints = self.endpoints.len(),
            interval_ms = self.interval.as_millis() as u64,
            alerting = self.alerting_enabled(),
            "starting health monitoring"
        );

        let handle = tokio::spawn(async move {
            self.run(shutdown_rx, report_tx).await;
        });

        MonitorHandle {
            shutdown_tx,
            reports: report_rx,
            handle,
        }
    }

    async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        reports: watch::Sender<Option<Arc<CycleReport>>>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    log_report(&report);
                    reports.send_replace(Some(Arc::new(report)));
                }
            }
        }
    }
}

fn log_report(report: &CycleReport) {
    for result in report.unhealthy() {
        warn!(
            endpoint = %result.endpoint_name,
            error = result.error_message().unwrap_or_default(),
            "endpoint unhealthy"
        );
    }
    let unhealthy = report.unhealthy().count();
    info!(
        healthy = report.results.len() - unhealthy,
        unhealthy,
        alerted = report.alerted,
        "health check cycle complete"
    );
}

/// Handle to a running monitor schedule.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    reports: watch::Receiver<Option<Arc<CycleReport>>>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// The most recent complete cycle, if one has finished.
    pub fn latest(&self) -> Option<Arc<CycleReport>> {
        self.reports.borrow().clone()
    }

    /// Receiver that is notified after every complete cycle.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CycleReport>>> {
        self.reports.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal shutdown and wait for the schedule to end. A cycle already in
    /// flight runs to completion first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "health monitor task failed");
        }
        info!("health monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    use bugtrack_core::{EndpointConfig, FixedClock};
    use chrono::TimeZone;

    /// Prober that answers from a script: (delay, healthy) per endpoint name.
    struct ScriptedProber {
        script: HashMap<String, (Duration, bool)>,
    }

    impl ScriptedProber {
        fn new(entries: &[(&str, u64, bool)]) -> Self {
            Self {
                script: entries
                    .iter()
                    .map(|(name, delay, ok)| {
                        (name.to_string(), (Duration::from_millis(*delay), *ok))
                    })
                    .collect(),
            }
        }
    }

    impl Prober for ScriptedProber {
        async fn probe(&self, endpoint: &Endpoint) -> ProbeResult {
            let (delay, healthy) = self.script[&endpoint.name];
            tokio::time::sleep(delay).await;
            if healthy {
                ProbeResult::healthy(&endpoint.name, delay.as_millis() as u64, 200, at())
            } else {
                ProbeResult::unhealthy(&endpoint.name, "request failed with status code 500", at())
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<AlertBatch>>>,
    }

    impl AlertSink for RecordingSink {
        async fn send(&self, batch: &AlertBatch) {
            self.batches.lock().unwrap().push(batch.clone());
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn config(names: &[&str], interval_ms: u64) -> MonitorConfig {
        MonitorConfig {
            endpoints: names
                .iter()
                .map(|name| EndpointConfig {
                    name: name.to_string(),
                    url: format!("http://{name}.invalid"),
                    timeout_ms: 1000,
                })
                .collect(),
            interval_ms,
            webhook_url: None,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn rejects_empty_endpoint_list() {
        let result = HealthMonitor::new(
            &config(&[], 1000),
            ScriptedProber::new(&[]),
            None::<RecordingSink>,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cycle_returns_one_result_per_endpoint_in_order() {
        let prober = ScriptedProber::new(&[("a", 60, true), ("b", 5, false), ("c", 30, true)]);
        let monitor =
            HealthMonitor::new(&config(&["a", "b", "c"], 1000), prober, None::<RecordingSink>)
                .unwrap();

        let report = monitor.run_cycle().await;
        let names: Vec<_> = report.results.iter().map(|r| r.endpoint_name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(report.healthy().count(), 2);
        assert_eq!(report.unhealthy().count(), 1);
        assert!(!report.all_healthy());
    }

    #[tokio::test]
    async fn probes_run_concurrently() {
        let prober = ScriptedProber::new(&[("a", 200, true), ("b", 200, true), ("c", 200, false)]);
        let monitor =
            HealthMonitor::new(&config(&["a", "b", "c"], 1000), prober, None::<RecordingSink>)
                .unwrap();

        let started = Instant::now();
        let report = monitor.run_cycle().await;
        assert_eq!(report.results.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn all_healthy_never_invokes_sink() {
        let sink = RecordingSink::default();
        let prober = ScriptedProber::new(&[("a", 1, true), ("b", 1, true)]);
        let monitor =
            HealthMonitor::new(&config(&["a", "b"], 1000), prober, Some(sink.clone())).unwrap();

        let report = monitor.run_cycle().await;
        assert!(report.all_healthy());
        assert!(!report.alerted);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unhealthy_results_become_one_ordered_batch() {
        let sink = RecordingSink::default();
        let prober = ScriptedProber::new(&[
            ("first", 50, false),
            ("second", 1, true),
            ("third", 1, false),
        ]);
        let monitor = HealthMonitor::new(
            &config(&["first", "second", "third"], 1000),
            prober,
            Some(sink.clone()),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock(at())));

        let report = monitor.run_cycle().await;
        assert!(report.alerted);

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let names: Vec<_> = batches[0]
            .unhealthy()
            .iter()
            .map(|r| r.endpoint_name.as_str())
            .collect();
        assert_eq!(names, ["first", "third"]);
        assert_eq!(batches[0].created_at(), at());
    }

    #[tokio::test]
    async fn no_sink_still_reports_unhealthy_results() {
        let prober = ScriptedProber::new(&[("a", 1, false)]);
        let monitor =
            HealthMonitor::new(&config(&["a"], 1000), prober, None::<RecordingSink>).unwrap();
        assert!(!monitor.alerting_enabled());

        let report = monitor.run_cycle().await;
        assert_eq!(report.unhealthy().count(), 1);
        assert!(!report.alerted);
    }

    #[tokio::test]
    async fn start_runs_first_cycle_immediately_and_stops() {
        let sink = RecordingSink::default();
        let prober = ScriptedProber::new(&[("a", 1, false)]);
        // Interval far longer than the test: only the immediate cycle runs.
        let monitor =
            HealthMonitor::new(&config(&["a"], 3_600_000), prober, Some(sink.clone())).unwrap();

        let handle = monitor.start();
        let mut reports = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(2), reports.wait_for(|r| r.is_some()))
            .await
            .expect("first cycle should run immediately")
            .unwrap();

        let latest = handle.latest().unwrap();
        assert_eq!(latest.results.len(), 1);
        assert!(handle.is_running());

        handle.stop().await;
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn schedule_repeats_on_interval() {
        let sink = RecordingSink::default();
        let prober = ScriptedProber::new(&[("a", 1, false)]);
        let monitor =
            HealthMonitor::new(&config(&["a"], 40), prober, Some(sink.clone())).unwrap();

        let handle = monitor.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop().await;

        let cycles = sink.batches.lock().unwrap().len();
        assert!(cycles >= 3, "expected several cycles, got {cycles}");
    }

    #[tokio::test]
    async fn stop_lets_in_flight_cycle_finish() {
        let sink = RecordingSink::default();
        let prober = ScriptedProber::new(&[("slow", 150, false)]);
        let monitor =
            HealthMonitor::new(&config(&["slow"], 3_600_000), prober, Some(sink.clone()))
                .unwrap();

        let handle = monitor.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;

        // The cycle that was probing when stop() was called completed and
        // alerted; nothing further ran.
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }
}
