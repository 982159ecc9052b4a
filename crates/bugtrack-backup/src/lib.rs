//! bugtrack-backup — data-store archives and their lifecycle.
//!
//! # Pipeline
//!
//! ```text
//! BackupArchiver::create_backup()
//!   ├── Dump    DumpTool::dump() → backups/backup-<timestamp>.gz   (fatal)
//!   ├── Upload  Uploader::upload() when an upload URL is set        (logged)
//!   └── Sweep   RetentionSweeper::sweep() keeps the newest N        (logged)
//! ```
//!
//! The backup directory is the only index: every `backup-*.gz` file in it is
//! one archive. `restore_backup()` replays an archive with drop semantics
//! and is never scheduled.

pub mod archiver;
pub mod dump;
pub mod error;
pub mod naming;
pub mod retention;
pub mod upload;

pub use archiver::{BackupArchiver, BackupReport, StageOutcome};
pub use dump::{DumpTool, MongoTools};
pub use error::{BackupError, BackupResult};
pub use naming::{archive_file_name, is_archive_name, parse_archive_timestamp};
pub use retention::{BackupRecord, RetentionSweeper, SweepError, SweepReport, list_backups, sweep};
pub use upload::{HttpUploader, UploadError, UploadPayload, Uploader};
