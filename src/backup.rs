//! Archiving hosted feature services to a bucket with retention pruning
//!
//! Archives are named `<sanitized title>_<DD_Mon_YYYY>.gdb.zip`. The date in
//! the name is the only record of when an item was archived: an item is
//! exported again only when it was modified after its latest archive date.

use crate::config::BackupConfig;
use crate::progress::Progress;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use feature_sync_bucket::ObjectBucket;
use feature_sync_service::{feature_services_owned_by, ExportFormat, Portal, PortalItem};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const MAX_UPLOAD_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

const ARCHIVE_SUFFIX: &str = ".gdb.zip";
const DATE_FORMAT: &str = "%d_%b_%Y";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    /// Sanitized names archived in this run
    pub added: Vec<String>,
    /// Titles not archived, whether unchanged or failed
    pub skipped: Vec<String>,
    /// Archive objects removed by retention
    pub pruned: Vec<String>,
}

/// A parsed archive object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub date: NaiveDate,
    pub object: String,
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_name(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `<name>_<DD_Mon_YYYY>` without the archive suffix.
pub fn archive_base_name(name: &str, date: NaiveDate) -> String {
    format!("{name}_{}", date.format(DATE_FORMAT))
}

pub fn archive_name(name: &str, date: NaiveDate) -> String {
    format!("{}{ARCHIVE_SUFFIX}", archive_base_name(name, date))
}

/// Parse `<name>_<DD>_<Mon>_<YYYY>.gdb.zip` (or plain `.zip`).
pub fn parse_archive_name(object: &str) -> Option<ArchiveEntry> {
    let base = object
        .strip_suffix(ARCHIVE_SUFFIX)
        .or_else(|| object.strip_suffix(".zip"))?;

    let mut parts = base.rsplitn(4, '_');
    let year = parts.next()?;
    let month = parts.next()?;
    let day = parts.next()?;
    let name = parts.next()?;

    let date =
        NaiveDate::parse_from_str(&format!("{day}_{month}_{year}"), DATE_FORMAT).ok()?;
    Some(ArchiveEntry {
        name: name.to_string(),
        date,
        object: object.to_string(),
    })
}

/// Latest archive date recorded for `name`.
pub fn last_archive_date(entries: &[ArchiveEntry], name: &str) -> Option<NaiveDate> {
    entries
        .iter()
        .filter(|e| e.name == name)
        .map(|e| e.date)
        .max()
}

/// Whether an archive dated `date` is pruned given `cutoff`. The archive
/// counts from midnight UTC of its date. `added` tells whether its item was
/// archived in this run.
pub fn should_prune(date: NaiveDate, cutoff: DateTime<Utc>, added: bool) -> bool {
    let archived_at = date.and_time(chrono::NaiveTime::MIN).and_utc();
    archived_at < cutoff && (!added || archived_at < cutoff)
}

/// `now` minus the retention window, or `None` when out of range.
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(TimeDelta::try_days(days)?)
}

/// Whether an item modified at `modified_ms` (epoch millis) needs a new
/// archive after the one dated `last`.
pub fn needs_archive(modified_ms: i64, last: Option<NaiveDate>) -> bool {
    let Some(last) = last else {
        return true;
    };
    let Some(modified) = Utc.timestamp_millis_opt(modified_ms).single() else {
        return true;
    };
    match last.and_hms_opt(0, 0, 0) {
        Some(archived_at) => modified > archived_at.and_utc(),
        None => true,
    }
}

/// Upload a local file, retrying with `delay` between attempts. Returns
/// whether any attempt succeeded.
pub async fn upload_with_retry(
    bucket: &dyn ObjectBucket,
    name: &str,
    path: &Path,
    retries: u32,
    delay: Duration,
) -> bool {
    for attempt in 1..=retries {
        match bucket.upload_file(name, path).await {
            Ok(()) => {
                info!("Successfully uploaded {name}");
                return true;
            }
            Err(e) => {
                error!("Attempt {attempt}/{retries} failed with error: {e:#}");
                if attempt < retries {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    error!("Upload of {name} failed after {retries} attempts.");
    false
}

/// Archive every owner's feature services, then optionally prune old
/// archives. Dates are taken from the current UTC time.
pub async fn backup(
    portal: &dyn Portal,
    bucket: &dyn ObjectBucket,
    config: &BackupConfig,
    progress: &Progress,
) -> Result<BackupSummary> {
    backup_at(portal, bucket, config, Utc::now(), RETRY_DELAY, progress).await
}

/// [`backup`] with an explicit clock and retry delay.
pub async fn backup_at(
    portal: &dyn Portal,
    bucket: &dyn ObjectBucket,
    config: &BackupConfig,
    now: DateTime<Utc>,
    retry_delay: Duration,
    progress: &Progress,
) -> Result<BackupSummary> {
    config.validate()?;
    let cutoff = match (config.remove_archives, config.duration_days) {
        (true, Some(days)) => Some(
            retention_cutoff(now, days)
                .with_context(|| format!("Retention of {days} days is out of range"))?,
        ),
        _ => None,
    };

    let mut items: Vec<PortalItem> = Vec::new();
    for owner in &config.owners {
        match portal
            .search(&feature_services_owned_by(owner), config.max_items)
            .await
        {
            Ok(found) => {
                progress
                    .info(format!("Found {} feature services owned by {owner}", found.len()))
                    .await;
                items.extend(found);
            }
            Err(e) => {
                progress
                    .error(format!("Failed to search items owned by {owner}: {e}"))
                    .await
            }
        }
    }

    let temp_dir;
    let dir: &Path = match &config.download_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            dir.as_path()
        }
        None => {
            temp_dir = tempfile::tempdir().context("Failed to create download directory")?;
            temp_dir.path()
        }
    };

    let existing = list_archives(bucket, progress).await?;
    let today = now.date_naive();
    let mut summary = BackupSummary::default();

    for (count, item) in items.iter().enumerate() {
        if count >= config.max_items {
            progress
                .info(format!(
                    "Reached the maximum limit of {} items to process.",
                    config.max_items
                ))
                .await;
            break;
        }

        let name = sanitize_name(&item.title);
        if !needs_archive(item.modified, last_archive_date(&existing, &name)) {
            progress
                .info(format!("Skipping {}, not modified since last backup.", item.title))
                .await;
            summary.skipped.push(item.title.clone());
            continue;
        }

        progress.info(format!("Downloading {}", item.title)).await;
        match archive_item(portal, bucket, item, &name, today, dir, retry_delay, progress).await {
            Ok(true) => {
                progress
                    .info(format!("Archived {} as {}", item.title, archive_name(&name, today)))
                    .await;
                summary.added.push(name);
            }
            Ok(false) => {
                progress
                    .error(format!("Upload of {} failed, skipping", item.title))
                    .await;
                summary.skipped.push(item.title.clone());
            }
            Err(e) => {
                progress
                    .error(format!("An error occurred downloading {}: {e:#}", item.title))
                    .await;
                summary.skipped.push(item.title.clone());
            }
        }
    }

    if let Some(cutoff) = cutoff {
        summary.pruned = prune_archives(bucket, cutoff, &summary.added, progress).await?;
    }

    progress
        .info(format!(
            "Backup finished: {} added, {} skipped, {} pruned",
            summary.added.len(),
            summary.skipped.len(),
            summary.pruned.len()
        ))
        .await;
    Ok(summary)
}

async fn list_archives(bucket: &dyn ObjectBucket, progress: &Progress) -> Result<Vec<ArchiveEntry>> {
    let objects = bucket
        .list("")
        .await
        .with_context(|| format!("Failed to list {}", bucket.display_name()))?;

    let mut entries = Vec::new();
    for object in objects {
        match parse_archive_name(&object.name) {
            Some(entry) => entries.push(entry),
            None => {
                progress
                    .debug(format!("Ignoring {}, not an archive name", object.name))
                    .await
            }
        }
    }
    Ok(entries)
}

/// Export, download and upload one item. `Ok(false)` means every upload
/// attempt failed.
#[allow(clippy::too_many_arguments)]
async fn archive_item(
    portal: &dyn Portal,
    bucket: &dyn ObjectBucket,
    item: &PortalItem,
    name: &str,
    today: NaiveDate,
    dir: &Path,
    retry_delay: Duration,
    progress: &Progress,
) -> Result<bool> {
    let export = portal
        .export_item(item, &archive_base_name(name, today), ExportFormat::FileGeodatabase)
        .await
        .context("Export failed")?;
    let local = portal
        .download_item(&export, dir)
        .await
        .context("Download failed")?;

    let uploaded = upload_with_retry(
        bucket,
        &archive_name(name, today),
        &local,
        MAX_UPLOAD_RETRIES,
        retry_delay,
    )
    .await;
    if !uploaded {
        return Ok(false);
    }

    // The archive is in the bucket; leftovers only warrant a warning
    if let Err(e) = tokio::fs::remove_file(&local).await {
        progress
            .warn(format!("Failed to remove {}: {e}", local.display()))
            .await;
    }
    if let Err(e) = portal.delete_item(&export).await {
        progress
            .warn(format!("Failed to delete the export item {}: {e}", export.id))
            .await;
    }
    Ok(true)
}

async fn prune_archives(
    bucket: &dyn ObjectBucket,
    cutoff: DateTime<Utc>,
    added: &[String],
    progress: &Progress,
) -> Result<Vec<String>> {
    let added: HashSet<&str> = added.iter().map(String::as_str).collect();
    let objects = bucket
        .list("")
        .await
        .with_context(|| format!("Failed to list {}", bucket.display_name()))?;

    let mut pruned = Vec::new();
    for object in objects {
        let Some(entry) = parse_archive_name(&object.name) else {
            progress
                .warn(format!("Could not parse a date from {}, keeping it", object.name))
                .await;
            continue;
        };

        if should_prune(entry.date, cutoff, added.contains(entry.name.as_str())) {
            bucket
                .delete(&entry.object)
                .await
                .with_context(|| format!("Failed to delete {}", entry.object))?;
            progress
                .info(format!("Deleted old archive: {}", entry.object))
                .await;
            pruned.push(entry.object);
        } else {
            progress
                .debug(format!("Kept archive {}", entry.object))
                .await;
        }
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Parcels (2024) - v2"), "Parcels__2024____v2");
        assert_eq!(sanitize_name("road_centrelines"), "road_centrelines");
    }

    #[test]
    fn test_archive_name_format() {
        assert_eq!(
            archive_name("Parcels", date(2024, 3, 5)),
            "Parcels_05_Mar_2024.gdb.zip"
        );
    }

    #[test]
    fn test_parse_archive_name() {
        let entry = parse_archive_name("Road_Centrelines_05_Mar_2024.gdb.zip").unwrap();
        assert_eq!(entry.name, "Road_Centrelines");
        assert_eq!(entry.date, date(2024, 3, 5));
        assert_eq!(entry.object, "Road_Centrelines_05_Mar_2024.gdb.zip");

        let plain = parse_archive_name("Parcels_31_Dec_2023.zip").unwrap();
        assert_eq!(plain.name, "Parcels");
        assert_eq!(plain.date, date(2023, 12, 31));
    }

    #[test]
    fn test_parse_rejects_other_names() {
        assert!(parse_archive_name("Parcels.gdb.zip").is_none());
        assert!(parse_archive_name("Parcels_latest_copy_now.gdb.zip").is_none());
        assert!(parse_archive_name("notes.txt").is_none());
        assert!(parse_archive_name("parcels/12.jpg").is_none());
    }

    #[test]
    fn test_last_archive_date_exact_name() {
        let entries: Vec<ArchiveEntry> = [
            "Parcels_01_Jan_2024.gdb.zip",
            "Parcels_01_Feb_2024.gdb.zip",
            "Parcels_Old_01_Jun_2024.gdb.zip",
        ]
        .iter()
        .filter_map(|n| parse_archive_name(n))
        .collect();

        assert_eq!(last_archive_date(&entries, "Parcels"), Some(date(2024, 2, 1)));
        assert_eq!(last_archive_date(&entries, "Parcels_Old"), Some(date(2024, 6, 1)));
        assert_eq!(last_archive_date(&entries, "Roads"), None);
    }

    #[test]
    fn test_should_prune() {
        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert!(should_prune(date(2024, 2, 1), cutoff, false));
        assert!(should_prune(date(2024, 2, 1), cutoff, true));
        // Midnight of the cutoff day is before the cutoff moment
        assert!(should_prune(date(2024, 3, 1), cutoff, false));
        assert!(!should_prune(date(2024, 3, 2), cutoff, false));
        assert!(!should_prune(date(2024, 4, 1), cutoff, true));
    }

    #[test]
    fn test_should_prune_at_midnight_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(!should_prune(date(2024, 3, 1), cutoff, false));
        assert!(should_prune(date(2024, 2, 29), cutoff, false));
    }

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            retention_cutoff(now, 5),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap())
        );
        assert_eq!(retention_cutoff(now, 0), Some(now));
        assert_eq!(retention_cutoff(now, 200_000_000_000), None);
        assert_eq!(retention_cutoff(now, i64::MAX), None);
    }

    #[test]
    fn test_needs_archive() {
        let last = date(2024, 3, 5);
        let before = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap().timestamp_millis();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap().timestamp_millis();
        let after = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap().timestamp_millis();

        assert!(!needs_archive(before, Some(last)));
        assert!(!needs_archive(midnight, Some(last)));
        assert!(needs_archive(after, Some(last)));
        assert!(needs_archive(before, None));
    }
}
