//! Retention sweep for the backup directory.
//!
//! Lists `backup-*.gz` files, ranks them newest first and deletes everything
//! past the retention count. A file that cannot be deleted is logged and
//! skipped; the rest of the sweep carries on.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bugtrack_core::{BackupConfig, RetentionOrder};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::naming::{is_archive_name, parse_archive_timestamp};

/// One archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub file_name: String,
    pub path: PathBuf,
    /// Instant embedded in the file name, when it parses.
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl BackupRecord {
    /// The instant this record is ranked by under `order`.
    pub fn rank_time(&self, order: RetentionOrder) -> DateTime<Utc> {
        match order {
            RetentionOrder::EmbeddedTimestamp => self.created_at.unwrap_or(self.modified_at),
            RetentionOrder::ModifiedTime => self.modified_at,
        }
    }
}

/// The backup directory could not be listed.
#[derive(Debug, Error)]
#[error("failed to list backup directory {path}: {source}")]
pub struct SweepError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Survivors, newest first.
    pub kept: Vec<BackupRecord>,
    /// File names removed.
    pub deleted: Vec<String>,
    /// File names that should have been removed but could not be.
    pub failed: Vec<String>,
}

/// List archives in `dir`, newest first. A missing directory has no archives.
pub fn list_backups(dir: &Path, order: RetentionOrder) -> Result<Vec<BackupRecord>, SweepError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "backup directory does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(SweepError {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut records = Vec::new();
    for entry in entries {
        let Some(entry) = readable(entry, dir) else {
            continue;
        };
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !is_archive_name(&file_name) {
            continue;
        }
        // The file may vanish between listing and stat.
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                debug!(file = %file_name, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        records.push(BackupRecord {
            created_at: parse_archive_timestamp(&file_name),
            path: entry.path(),
            file_name,
            modified_at,
            size_bytes: metadata.len(),
        });
    }

    sort_newest_first(&mut records, order);
    Ok(records)
}

/// One unreadable directory entry is skipped, not fatal to the listing.
fn readable<T>(entry: io::Result<T>, dir: &Path) -> Option<T> {
    match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
            None
        }
    }
}

/// Stable newest-first ordering; equal instants fall back to the file name,
/// descending.
fn sort_newest_first(records: &mut [BackupRecord], order: RetentionOrder) {
    records.sort_by(|a, b| match b.rank_time(order).cmp(&a.rank_time(order)) {
        Ordering::Equal => b.file_name.cmp(&a.file_name),
        other => other,
    });
}

/// Delete all but the newest `retention_count` archives in `dir`.
///
/// A `retention_count` of zero deletes every archive.
pub fn sweep(
    dir: &Path,
    retention_count: usize,
    order: RetentionOrder,
) -> Result<SweepReport, SweepError> {
    sweep_with(dir, retention_count, order, |path| fs::remove_file(path))
}

fn sweep_with<F>(
    dir: &Path,
    retention_count: usize,
    order: RetentionOrder,
    mut remove: F,
) -> Result<SweepReport, SweepError>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut records = list_backups(dir, order)?;
    let stale = if records.len() > retention_count {
        records.split_off(retention_count)
    } else {
        Vec::new()
    };

    let mut report = SweepReport {
        kept: records,
        ..SweepReport::default()
    };

    for record in stale {
        match remove(&record.path) {
            Ok(()) => {
                info!(file = %record.file_name, "deleted old backup");
                report.deleted.push(record.file_name);
            }
            Err(e) => {
                warn!(file = %record.file_name, error = %e, "failed to delete old backup");
                report.failed.push(record.file_name);
            }
        }
    }

    debug!(
        kept = report.kept.len(),
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "retention sweep complete"
    );
    Ok(report)
}

/// A directory plus the policy to sweep it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionSweeper {
    dir: PathBuf,
    retention_count: usize,
    order: RetentionOrder,
}

impl RetentionSweeper {
    pub fn new(dir: impl Into<PathBuf>, retention_count: usize, order: RetentionOrder) -> Self {
        Self {
            dir: dir.into(),
            retention_count,
            order,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(&config.dir, config.retention_count, config.order)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention_count(&self) -> usize {
        self.retention_count
    }

    pub fn list(&self) -> Result<Vec<BackupRecord>, SweepError> {
        list_backups(&self.dir, self.order)
    }

    pub fn sweep(&self) -> Result<SweepReport, SweepError> {
        sweep(&self.dir, self.retention_count, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    use chrono::TimeZone;

    use crate::naming::archive_file_name;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"archive").unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    fn stamped(day: u32) -> String {
        archive_file_name(Utc.with_ymd_and_hms(2024, 1, day, 3, 0, 0).unwrap())
    }

    fn names(records: &[BackupRecord]) -> Vec<&str> {
        records.iter().map(|r| r.file_name.as_str()).collect()
    }

    #[test]
    fn keeps_the_k_most_recently_modified() {
        let dir = tempfile::tempdir().unwrap();
        for (name, age) in [
            ("backup-a.gz", 50),
            ("backup-b.gz", 10),
            ("backup-c.gz", 40),
            ("backup-d.gz", 20),
            ("backup-e.gz", 30),
        ] {
            touch(dir.path(), name, age);
        }

        let report = sweep(dir.path(), 2, RetentionOrder::ModifiedTime).unwrap();
        assert_eq!(names(&report.kept), ["backup-b.gz", "backup-d.gz"]);
        assert_eq!(report.deleted.len(), 3);
        assert!(report.failed.is_empty());

        assert!(dir.path().join("backup-b.gz").exists());
        assert!(dir.path().join("backup-d.gz").exists());
        assert!(!dir.path().join("backup-a.gz").exists());
        assert!(!dir.path().join("backup-c.gz").exists());
        assert!(!dir.path().join("backup-e.gz").exists());
    }

    #[test]
    fn nothing_deleted_at_or_under_retention() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "backup-a.gz", 10);
        touch(dir.path(), "backup-b.gz", 20);

        let report = sweep(dir.path(), 2, RetentionOrder::ModifiedTime).unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.kept.len(), 2);

        let report = sweep(dir.path(), 7, RetentionOrder::ModifiedTime).unwrap();
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn zero_retention_deletes_every_archive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "backup-a.gz", 10);
        touch(dir.path(), "backup-b.gz", 20);

        let report = sweep(dir.path(), 0, RetentionOrder::EmbeddedTimestamp).unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert!(report.kept.is_empty());
    }

    #[test]
    fn unrelated_files_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notes.txt", 100);
        touch(dir.path(), "backup-old.tar", 100);
        touch(dir.path(), "backup-a.gz", 100);
        fs::create_dir(dir.path().join("backup-dir.gz")).unwrap();

        let report = sweep(dir.path(), 0, RetentionOrder::ModifiedTime).unwrap();
        assert_eq!(report.deleted, ["backup-a.gz"]);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("backup-old.tar").exists());
        assert!(dir.path().join("backup-dir.gz").exists());
    }

    #[test]
    fn embedded_timestamp_wins_over_mtime() {
        let dir = tempfile::tempdir().unwrap();
        // The oldest archive was touched most recently.
        touch(dir.path(), &stamped(1), 1);
        touch(dir.path(), &stamped(2), 300);
        touch(dir.path(), &stamped(3), 200);

        let report = sweep(dir.path(), 2, RetentionOrder::EmbeddedTimestamp).unwrap();
        assert_eq!(names(&report.kept), [stamped(3), stamped(2)]);
        assert_eq!(report.deleted, [stamped(1)]);
    }

    #[test]
    fn modified_time_order_follows_mtime() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &stamped(1), 1);
        touch(dir.path(), &stamped(2), 300);
        touch(dir.path(), &stamped(3), 200);

        let report = sweep(dir.path(), 2, RetentionOrder::ModifiedTime).unwrap();
        assert_eq!(report.deleted, [stamped(2)]);
    }

    #[test]
    fn equal_instants_break_ties_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(60);
        for name in ["backup-a.gz", "backup-c.gz", "backup-b.gz"] {
            let path = dir.path().join(name);
            fs::write(&path, b"x").unwrap();
            File::options().write(true).open(&path).unwrap().set_modified(mtime).unwrap();
        }

        let records = list_backups(dir.path(), RetentionOrder::ModifiedTime).unwrap();
        assert_eq!(names(&records), ["backup-c.gz", "backup-b.gz", "backup-a.gz"]);
    }

    #[test]
    fn failed_deletion_does_not_stop_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=4 {
            touch(dir.path(), &stamped(day), 10);
        }
        let stuck = stamped(2);

        let report = sweep_with(dir.path(), 1, RetentionOrder::EmbeddedTimestamp, |path| {
            if path.file_name().and_then(|n| n.to_str()) == Some(stuck.as_str()) {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                fs::remove_file(path)
            }
        })
        .unwrap();

        assert_eq!(names(&report.kept), [stamped(4)]);
        assert_eq!(report.failed, [stamped(2)]);
        assert_eq!(report.deleted, [stamped(3), stamped(1)]);
        assert!(dir.path().join(stamped(2)).exists());
        assert!(!dir.path().join(stamped(1)).exists());
        assert!(!dir.path().join(stamped(3)).exists());
    }

    #[test]
    fn unreadable_entry_is_skipped() {
        let dir = Path::new("backups");
        let err: io::Result<u8> = Err(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(readable(err, dir), None);
        assert_eq!(readable(Ok(7u8), dir), Some(7));
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let report = sweep(&dir.path().join("absent"), 3, RetentionOrder::default()).unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn sweeper_uses_config_policy() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &stamped(1), 10);
        touch(dir.path(), &stamped(2), 10);

        let config = BackupConfig {
            dir: dir.path().to_path_buf(),
            retention_count: 1,
            ..BackupConfig::default()
        };
        let sweeper = RetentionSweeper::from_config(&config);
        assert_eq!(sweeper.list().unwrap().len(), 2);

        let report = sweeper.sweep().unwrap();
        assert_eq!(report.deleted, [stamped(1)]);
        assert_eq!(sweeper.list().unwrap().len(), 1);
    }
}
