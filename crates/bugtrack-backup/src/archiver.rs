//! Backup archiver — the create and restore pipelines.
//!
//! `create_backup` runs three stages. The dump is fatal: its failure is
//! reported and returned. Upload and sweep failures are logged and recorded
//! in the `BackupReport`, and the call still succeeds with the local
//! archive path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bugtrack_core::{
    BackupConfig, Clock, ErrorContext, ErrorReporter, OpsConfig, SystemClock,
    TracingReporter,
};
use tracing::{error, info, warn};

use crate::dump::{DumpTool, MongoTools};
use crate::error::{BackupError, BackupResult};
use crate::naming::archive_file_name;
use crate::retention::{RetentionSweeper, SweepReport};
use crate::upload::{HttpUploader, Uploader};

/// Remove whatever a failed dump left at `archive`; a partial file must not
/// count toward retention.
async fn discard_partial(archive: &Path) {
    match tokio::fs::remove_file(archive).await {
        Ok(()) => warn!(path = %archive.display(), "removed partial archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            error!(path = %archive.display(), error = %e, "failed to remove partial archive");
        }
    }
}

/// Result of a non-fatal pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome<T = ()> {
    Completed(T),
    /// The stage is not configured.
    Skipped,
    Failed { error: String },
}

impl<T> StageOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

/// What `create_backup` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    pub upload: StageOutcome,
    pub sweep: StageOutcome<SweepReport>,
}

/// Creates and restores data-store archives in one backup directory.
pub struct BackupArchiver<D = MongoTools, U = HttpUploader> {
    config: BackupConfig,
    sweeper: RetentionSweeper,
    tool: D,
    uploader: Option<U>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
}

impl BackupArchiver<MongoTools, HttpUploader> {
    /// Wire up the MongoDB tools, the HTTP uploader when an upload URL is
    /// configured, and a tracing reporter.
    pub fn from_config(config: &OpsConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let uploader = config
            .backup
            .upload_url
            .as_deref()
            .map(|url| {
                HttpUploader::new(url)
                    .with_timeout(config.backup.upload_timeout())
                    .with_clock(clock.clone())
            });
        Self::new(&config.backup, MongoTools::from_config(&config.backup), uploader)
            .with_clock(clock)
            .with_reporter(Arc::new(TracingReporter::new(&config.reporting)))
    }
}

impl<D: DumpTool, U: Uploader> BackupArchiver<D, U> {
    pub fn new(config: &BackupConfig, tool: D, uploader: Option<U>) -> Self {
        Self {
            config: config.clone(),
            sweeper: RetentionSweeper::from_config(config),
            tool,
            uploader,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.config.dir
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }

    /// Dump the store to a new timestamped archive, then upload and sweep.
    pub async fn create_backup(&self) -> BackupResult<BackupReport> {
        let uri = self.require_uri("backup.create")?;

        if let Err(source) = tokio::fs::create_dir_all(&self.config.dir).await {
            let err = BackupError::FileSystem {
                path: self.config.dir.clone(),
                source,
            };
            return Err(self.fail("backup.create", &self.config.dir, err));
        }

        let archive = self.config.dir.join(archive_file_name(self.clock.now()));
        info!(path = %archive.display(), "creating backup");

        if let Err(e) = self.tool.dump(uri, &archive).await {
            discard_partial(&archive).await;
            return Err(self.fail("backup.create", &archive, e));
        }
        info!(path = %archive.display(), "backup created");

        let upload = self.upload_stage(&archive).await;
        let sweep = self.sweep_stage().await;

        Ok(BackupReport {
            archive_path: archive,
            upload,
            sweep,
        })
    }

    /// Replace the store's contents with `archive`. Existing data is
    /// dropped; never call this on a schedule.
    pub async fn restore_backup(&self, archive: &Path) -> BackupResult<()> {
        if archive.as_os_str().is_empty() {
            let err = BackupError::Usage("a backup file path is required".to_string());
            return Err(self.fail("backup.restore", archive, err));
        }
        let uri = self.require_uri("backup.restore")?;

        match tokio::fs::metadata(archive).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                let err = BackupError::Usage(format!("{} is not a file", archive.display()));
                return Err(self.fail("backup.restore", archive, err));
            }
            Err(source) => {
                let err = BackupError::FileSystem {
                    path: archive.to_path_buf(),
                    source,
                };
                return Err(self.fail("backup.restore", archive, err));
            }
        }

        warn!(path = %archive.display(), "restoring backup, existing data will be dropped");
        if let Err(e) = self.tool.restore(uri, archive).await {
            return Err(self.fail("backup.restore", archive, e));
        }
        info!(path = %archive.display(), "backup restored successfully");
        Ok(())
    }

    async fn upload_stage(&self, archive: &Path) -> StageOutcome {
        let Some(uploader) = &self.uploader else {
            return StageOutcome::Skipped;
        };
        match uploader.upload(archive).await {
            Ok(()) => {
                info!(path = %archive.display(), "backup uploaded successfully");
                StageOutcome::Completed(())
            }
            Err(e) => {
                error!(path = %archive.display(), error = %e, "backup upload failed");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn sweep_stage(&self) -> StageOutcome<SweepReport> {
        let sweeper = self.sweeper.clone();
        match tokio::task::spawn_blocking(move || sweeper.sweep()).await {
            Ok(Ok(report)) => StageOutcome::Completed(report),
            Ok(Err(e)) => {
                error!(error = %e, "backup cleanup failed");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "backup cleanup task failed");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn require_uri(&self, operation: &'static str) -> BackupResult<&str> {
        self.config
            .require_uri()
            .map_err(|e| self.fail(operation, &self.config.dir, e.into()))
    }

    /// Report a fatal error before handing it back to the caller.
    fn fail(&self, operation: &'static str, target: &Path, err: BackupError) -> BackupError {
        self.reporter
            .report(&err, &ErrorContext::new(operation, target.display().to_string()));
        err
    }
}
