use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use bugtrack_backup::{BackupArchiver, BackupRecord, BackupReport, RetentionSweeper, StageOutcome};
use bugtrack_core::OpsConfig;

pub async fn create(config: &OpsConfig) -> anyhow::Result<()> {
    let report = BackupArchiver::from_config(config)
        .create_backup()
        .await
        .context("backup failed")?;
    print!("{}", render_report(&report));
    Ok(())
}

pub async fn restore(config: &OpsConfig, path: &Path) -> anyhow::Result<()> {
    BackupArchiver::from_config(config)
        .restore_backup(path)
        .await
        .with_context(|| format!("restore of {} failed", path.display()))?;
    println!("Backup restored successfully from {}", path.display());
    Ok(())
}

pub fn list(config: &OpsConfig) -> anyhow::Result<()> {
    let records = RetentionSweeper::from_config(&config.backup).list()?;
    if records.is_empty() {
        println!("No backups in {}", config.backup.dir.display());
        return Ok(());
    }
    print!("{}", render_records(&records));
    Ok(())
}

pub fn sweep(config: &OpsConfig) -> anyhow::Result<()> {
    let sweeper = RetentionSweeper::from_config(&config.backup);
    let report = sweeper.sweep()?;
    println!(
        "Kept {} backup(s), deleted {}",
        report.kept.len(),
        report.deleted.len()
    );
    for name in &report.deleted {
        println!("  deleted {name}");
    }
    for name in &report.failed {
        eprintln!("  could not delete {name}");
    }
    Ok(())
}

fn render_report(report: &BackupReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup created: {}", report.archive_path.display());
    let _ = match &report.upload {
        StageOutcome::Completed(()) => writeln!(out, "  upload: done"),
        StageOutcome::Skipped => writeln!(out, "  upload: not configured"),
        StageOutcome::Failed { error } => writeln!(out, "  upload: failed ({error})"),
    };
    let _ = match &report.sweep {
        StageOutcome::Completed(sweep) => writeln!(
            out,
            "  cleanup: kept {}, deleted {}",
            sweep.kept.len(),
            sweep.deleted.len()
        ),
        StageOutcome::Skipped => writeln!(out, "  cleanup: skipped"),
        StageOutcome::Failed { error } => writeln!(out, "  cleanup: failed ({error})"),
    };
    out
}

fn render_records(records: &[BackupRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{:<40} {:>12} bytes  {}",
            record.file_name,
            record.size_bytes,
            record.modified_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}
