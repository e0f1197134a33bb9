use crate::progress::Progress;
use anyhow::{Context, Result};
use feature_sync_bucket::{BucketObject, ObjectBucket};
use feature_sync_postgresql::{AttachmentStore, TableDescriptor};
use feature_sync_service::FeatureService;
use std::collections::BTreeMap;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Attachment rows visited
    pub processed: usize,
    pub uploaded: usize,
    /// Rows whose object was already in the bucket
    pub reused: usize,
    /// Objects under the table prefix that no row referenced
    pub deleted: usize,
}

/// Split a file name into stem and extension (with its dot). Leading dots
/// belong to the stem.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if name[..i].chars().any(|c| c != '.') => name.split_at(i),
        _ => (name, ""),
    }
}

/// Replace every character of the stem outside `[A-Za-z0-9]` with `_`,
/// keeping the extension.
pub fn sanitize_file_name(name: &str) -> String {
    let (stem, extension) = split_extension(name);
    let stem: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{stem}{extension}")
}

/// `<table>/<attachment id><extension>`
pub fn object_name(table: &str, attachment_id: i64, display_name: &str) -> String {
    let (_, extension) = split_extension(display_name);
    format!("{table}/{attachment_id}{extension}")
}

/// Make the bucket mirror the attachment table.
///
/// Rows whose object is missing get their content fetched and uploaded;
/// every row is then pointed at its bucket URL and sanitized name. Objects
/// under `<table>/` that no row references are deleted at the end. The first
/// failure aborts the pass; rows already rewritten stay rewritten.
pub async fn sync_attachments(
    store: &dyn AttachmentStore,
    content: &dyn FeatureService,
    bucket: &dyn ObjectBucket,
    table: &TableDescriptor,
    progress: &Progress,
) -> Result<SyncSummary> {
    progress.info("Starting transfer attachments").await;

    let attach = table.attachment_table();
    let exists = store
        .table_exists(&table.schema, &attach)
        .await
        .context("Failed to check for the attachment table")?;
    progress
        .debug(format!("Attachment table exists: {exists}"))
        .await;
    let mut summary = SyncSummary::default();
    if !exists {
        progress
            .info(format!("No attachment table {}.{attach}, nothing to transfer", table.schema))
            .await;
        return Ok(summary);
    }

    let prefix = format!("{}/", table.table);
    let mut objects: BTreeMap<String, BucketObject> = bucket
        .list(&prefix)
        .await
        .with_context(|| format!("Failed to list {} under {prefix}", bucket.display_name()))?
        .into_iter()
        .map(|object| (object.name.clone(), object))
        .collect();
    progress
        .debug(format!(
            "Found {} {} attachments in {}",
            objects.len(),
            table.table,
            bucket.display_name()
        ))
        .await;

    let rows = store
        .attachment_rows(&table.schema, &attach)
        .await
        .context("Failed to read attachment rows")?;

    for row in rows {
        summary.processed += 1;
        let target = object_name(&table.table, row.attachment_id, &row.name);
        let file_name = sanitize_file_name(&row.name);

        if objects.remove(&target).is_some() {
            summary.reused += 1;
            progress
                .debug(format!(
                    "Attachment {target} already exists in bucket {}",
                    bucket.display_name()
                ))
                .await;
        } else {
            let url = row.url.as_deref().with_context(|| {
                format!("Attachment row {} has no url to fetch from", row.object_id)
            })?;
            if let Err(e) = upload_from_url(content, bucket, url, &target).await {
                progress
                    .error(format!("An error occurred during transferring attachments: {e:#}"))
                    .await;
                return Err(e);
            }
            summary.uploaded += 1;
            progress
                .debug(format!("Transferred {file_name} to {target}"))
                .await;
        }

        store
            .update_attachment(
                &table.schema,
                &attach,
                row.object_id,
                &bucket.object_url(&target),
                &file_name,
            )
            .await
            .with_context(|| format!("Failed to update attachment row {}", row.object_id))?;
    }

    for name in objects.keys() {
        bucket
            .delete(name)
            .await
            .with_context(|| format!("Failed to delete {name}"))?;
        summary.deleted += 1;
        progress.debug(format!("Deleted attachment: {name}")).await;
    }

    progress
        .info(format!(
            "Finished transferring attachments to {}",
            bucket.display_name()
        ))
        .await;
    progress
        .info(format!("Total attachments transferred: {}", summary.processed))
        .await;
    progress
        .info(format!(
            "Deleted {} attachments from bucket {}",
            summary.deleted,
            bucket.display_name()
        ))
        .await;
    Ok(summary)
}

/// Stream `url` into a spool file, then upload that file as `target`.
async fn upload_from_url(
    content: &dyn FeatureService,
    bucket: &dyn ObjectBucket,
    url: &str,
    target: &str,
) -> Result<()> {
    let spool = tempfile::NamedTempFile::new().context("Failed to create attachment spool file")?;
    content
        .download_to(url, spool.path())
        .await
        .with_context(|| format!("Failed to fetch attachment content from {url}"))?;
    bucket
        .upload_file(target, spool.path())
        .await
        .with_context(|| format!("Failed to write {target}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("photo.jpg"), ("photo", ".jpg"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension(""), ("", ""));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Site photo (1).JPG"), "Site_photo__1_.JPG");
        assert_eq!(sanitize_file_name("plan-v2.final.pdf"), "plan_v2_final.pdf");
        assert_eq!(sanitize_file_name("notes"), "notes");
    }

    #[test]
    fn test_object_name_uses_attachment_id() {
        assert_eq!(object_name("parcels", 42, "Site photo.jpg"), "parcels/42.jpg");
        assert_eq!(object_name("parcels", 43, "scan"), "parcels/43");
    }
}
