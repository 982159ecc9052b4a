//! External dump/restore tool invocation.
//!
//! Runs `mongodump` / `mongorestore` directly (no shell) with a gzip
//! single-file archive. The connection URI is passed as an argument but is
//! never logged since it usually carries credentials.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use bugtrack_core::BackupConfig;
use tokio::process::Command;
use tracing::debug;

use crate::error::BackupError;

/// A tool that can write and replay data-store archives.
pub trait DumpTool: Send + Sync {
    /// Write a compressed archive of the store at `uri` to `archive`.
    fn dump(&self, uri: &str, archive: &Path)
    -> impl Future<Output = Result<(), BackupError>> + Send;

    /// Replace the contents of the store at `uri` with `archive`.
    /// Existing collections are dropped first.
    fn restore(
        &self,
        uri: &str,
        archive: &Path,
    ) -> impl Future<Output = Result<(), BackupError>> + Send;
}

/// The MongoDB database tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoTools {
    dump_program: PathBuf,
    restore_program: PathBuf,
}

impl MongoTools {
    pub fn new(dump_program: impl Into<PathBuf>, restore_program: impl Into<PathBuf>) -> Self {
        Self {
            dump_program: dump_program.into(),
            restore_program: restore_program.into(),
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(&config.dump_program, &config.restore_program)
    }
}

impl Default for MongoTools {
    fn default() -> Self {
        Self::new("mongodump", "mongorestore")
    }
}

impl DumpTool for MongoTools {
    async fn dump(&self, uri: &str, archive: &Path) -> Result<(), BackupError> {
        run_tool(&self.dump_program, dump_args(uri, archive)).await
    }

    async fn restore(&self, uri: &str, archive: &Path) -> Result<(), BackupError> {
        run_tool(&self.restore_program, restore_args(uri, archive)).await
    }
}

/// `--uri=<uri> --archive=<path> --gzip`
pub fn dump_args(uri: &str, archive: &Path) -> Vec<OsString> {
    vec![
        OsString::from(format!("--uri={uri}")),
        archive_arg(archive),
        OsString::from("--gzip"),
    ]
}

/// `--uri=<uri> --archive=<path> --gzip --drop`
pub fn restore_args(uri: &str, archive: &Path) -> Vec<OsString> {
    let mut args = dump_args(uri, archive);
    args.push(OsString::from("--drop"));
    args
}

fn archive_arg(archive: &Path) -> OsString {
    let mut arg = OsString::from("--archive=");
    arg.push(archive.as_os_str());
    arg
}

async fn run_tool(program: &Path, args: Vec<OsString>) -> Result<(), BackupError> {
    let name = program.display().to_string();
    debug!(program = %name, args = args.len(), "running external tool");

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| BackupError::Spawn {
            program: name.clone(),
            source,
        })?;

    if output.status.success() {
        debug!(program = %name, "external tool finished");
        return Ok(());
    }

    Err(BackupError::ExternalProcess {
        program: name,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
