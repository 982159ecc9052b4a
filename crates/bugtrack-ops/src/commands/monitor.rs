use std::fmt::Write as _;

use anyhow::{Context, bail};
use bugtrack_core::OpsConfig;
use bugtrack_health::{CycleReport, HealthMonitor};
use tracing::info;

use crate::OutputFormat;

/// Start the monitor and block until Ctrl-C.
pub async fn run(config: &OpsConfig) -> anyhow::Result<()> {
    let handle = HealthMonitor::from_config(&config.monitor)?.start();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("received ctrl-c");
    handle.stop().await;
    Ok(())
}

/// Run one cycle, print the results and fail when anything is down.
pub async fn check(config: &OpsConfig, format: OutputFormat) -> anyhow::Result<()> {
    let monitor = HealthMonitor::from_config(&config.monitor)?;
    let report = monitor.run_cycle().await;

    match format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.results)?),
    }

    let down = report.unhealthy().count();
    if down > 0 {
        bail!("{down} of {} endpoint(s) unhealthy", report.results.len());
    }
    Ok(())
}

fn render_text(report: &CycleReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        let _ = match (result.response_time_ms(), result.error_message()) {
            (Some(ms), _) => writeln!(
                out,
                "  ✓ {:<20} {:>4} {:>6}ms",
                result.endpoint_name,
                result.status_code().map(|c| c.to_string()).unwrap_or_default(),
                ms
            ),
            (None, error) => writeln!(
                out,
                "  ✗ {:<20} {}",
                result.endpoint_name,
                error.unwrap_or("unknown error")
            ),
        };
    }
    let healthy = report.healthy().count();
    let _ = writeln!(out, "{healthy}/{} healthy", report.results.len());
    out
}
