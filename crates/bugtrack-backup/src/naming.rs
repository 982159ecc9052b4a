//! Archive file naming.
//!
//! Archives are named `backup-<ISO8601>.gz` with `:` and `.` replaced by
//! `-`, e.g. `backup-2024-03-05T14-07-09-042Z.gz`, so the name sorts and
//! parses without touching filesystem metadata.

use bugtrack_core::iso8601;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

pub const ARCHIVE_PREFIX: &str = "backup-";
pub const ARCHIVE_SUFFIX: &str = ".gz";

/// File name for an archive taken at `at`.
pub fn archive_file_name(at: DateTime<Utc>) -> String {
    let stamp = iso8601(at).replace([':', '.'], "-");
    format!("{ARCHIVE_PREFIX}{stamp}{ARCHIVE_SUFFIX}")
}

/// Whether `name` looks like an archive produced by this tool.
pub fn is_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)
}

/// Recover the instant embedded in an archive name.
pub fn parse_archive_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_SUFFIX)?
        .strip_suffix('Z')?;
    let (date, time) = stamp.split_once('T')?;

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;

    let mut parts = time.split('-').map(|p| p.parse::<u32>().ok());
    let hour = parts.next()??;
    let minute = parts.next()??;
    let second = parts.next()??;
    let millis = parts.next()??;
    if parts.next().is_some() {
        return None;
    }
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;

    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}
