//! bugtrack-ops — operational tooling for the bug tracker.
//!
//! # Usage
//!
//! ```text
//! bugtrack-ops backup create
//! bugtrack-ops backup restore backups/backup-2024-05-20T02-00-00-000Z.gz
//! bugtrack-ops monitor
//! bugtrack-ops check --format json
//! ```

use std::path::PathBuf;

use bugtrack_core::OpsConfig;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "bugtrack-ops",
    about = "Bugtrack operations — backups and health monitoring",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./bugtrack-ops.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, restore, and prune MongoDB backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Run health checks on the configured interval until Ctrl-C
    Monitor,
    /// Run a single health check cycle and print the results.
    ///
    /// Exits non-zero when any endpoint is unhealthy.
    Check {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Dump the database, upload the archive if configured, prune old archives
    Create,
    /// Restore an archive, dropping existing data first
    Restore {
        /// Path to a backup-*.gz archive
        path: PathBuf,
    },
    /// List archives in the backup directory, newest first
    List,
    /// Delete archives beyond the retention count
    Sweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = OpsConfig::load(cli.config.as_deref(), |key| std::env::var(key).ok())?;

    match cli.command {
        Commands::Backup { action } => match action {
            BackupAction::Create => commands::backup::create(&config).await,
            BackupAction::Restore { path } => commands::backup::restore(&config, &path).await,
            BackupAction::List => commands::backup::list(&config),
            BackupAction::Sweep => commands::backup::sweep(&config),
        },
        Commands::Monitor => commands::monitor::run(&config).await,
        Commands::Check { format } => commands::monitor::check(&config, format).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bugtrack=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
