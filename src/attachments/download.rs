use crate::forward::{report_prepare, TransferSummary};
use crate::progress::Progress;
use anyhow::{Context, Result};
use feature_sync_postgresql::attachment::{
    create_staging_table_sql, merge_staging_sql, truncate_staging_sql,
};
use feature_sync_postgresql::{
    prepare_attachment_table, AttachmentRecord, AttachmentStore, ParentKey, TableDescriptor,
};
use feature_sync_service::{AttachmentGroup, FeatureService};

/// One record per attachment, carrying its parent's identifiers.
pub fn flatten_groups(groups: Vec<AttachmentGroup>) -> Vec<AttachmentRecord> {
    groups
        .into_iter()
        .flat_map(|group| {
            let parent_oid = group.parent_object_id;
            let parent_globalid = group.parent_global_id;
            group
                .attachment_infos
                .into_iter()
                .map(move |info| AttachmentRecord {
                    attachment_id: info.id,
                    parent_oid,
                    parent_globalid: parent_globalid.clone(),
                    name: info.name,
                    size: info.size,
                    content_type: info.content_type,
                    exif_info: info.exif_info,
                    keywords: info.keywords,
                    url: info.url,
                })
        })
        .collect()
}

/// Page attachment records from the layer into `<table>_attach`.
///
/// Each page goes through the session staging table and is merged onto the
/// parent table using `key`. The cursor advances by the number of
/// attachments in the page, not the number of groups.
pub async fn download_attachments(
    service: &dyn FeatureService,
    store: &dyn AttachmentStore,
    layer_url: &str,
    table: &TableDescriptor,
    key: &ParentKey,
    batch_size: usize,
    progress: &Progress,
) -> Result<TransferSummary> {
    progress.info("Starting download attachment records").await;

    let outcome = prepare_attachment_table(store, table)
        .await
        .with_context(|| format!("Failed to prepare {}_attach", table.display_name()))?;
    report_prepare(progress, table, outcome).await;

    let mut offset = 0;
    let mut summary = TransferSummary::default();
    let mut staging_ready = false;

    loop {
        let groups = service
            .query_attachments(layer_url, offset, batch_size)
            .await
            .with_context(|| {
                format!("Failed to fetch attachments from {layer_url} at offset {offset}")
            })?
            .into_groups();
        if groups.is_empty() {
            progress.debug("No more data").await;
            break;
        }

        progress
            .info(format!("Processing batch from offset {offset}, size {batch_size}."))
            .await;
        progress.info(format!("Features in batch: {}", groups.len())).await;

        let records = flatten_groups(groups);
        if !records.is_empty() {
            if !staging_ready {
                store
                    .execute(&create_staging_table_sql(table))
                    .await
                    .context("Failed to create attachment staging table")?;
                staging_ready = true;
            }
            store
                .insert_staging(&table.staging_table(), &records)
                .await
                .context("Failed to stage attachment records")?;
            let merged = store
                .execute(&merge_staging_sql(table, key))
                .await
                .context("Failed to merge staged attachment records")?;
            store
                .execute(&truncate_staging_sql(table))
                .await
                .context("Failed to empty attachment staging table")?;
            progress.debug(format!("Merged {merged} attachment records")).await;
        }

        let processed = records.len();
        summary.total_imported += processed;
        summary.pages += 1;
        offset += processed;

        progress
            .debug(format!("Processed {processed} attachments in current batch."))
            .await;
        progress
            .debug(format!("Total processed: {}", summary.total_imported))
            .await;

        if processed < batch_size {
            progress.debug("Last batch processed").await;
            break;
        }
    }

    progress.info("Finished download attachment records").await;
    progress
        .info(format!("Total attachments imported: {}", summary.total_imported))
        .await;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_groups() {
        let groups: Vec<AttachmentGroup> = serde_json::from_value(json!([
            {
                "parentObjectId": 7,
                "parentGlobalId": "{A1}",
                "attachmentInfos": [
                    {"id": 1, "name": "front.jpg", "size": 2048, "contentType": "image/jpeg",
                     "exifInfo": [{"name": "Exif IFD0"}], "keywords": "", "url": "https://x/1"},
                    {"id": 2, "name": "back.jpg", "size": 1024, "contentType": "image/jpeg",
                     "url": "https://x/2"}
                ]
            },
            {"parentObjectId": 8, "attachmentInfos": []},
            {
                "parentObjectId": 9,
                "attachmentInfos": [{"id": 3, "name": "plan.pdf"}]
            }
        ]))
        .unwrap();

        let records = flatten_groups(groups);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].parent_oid, 7);
        assert_eq!(records[0].parent_globalid.as_deref(), Some("{A1}"));
        assert!(records[0].exif_info.is_some());
        assert_eq!(records[1].attachment_id, 2);
        assert_eq!(records[1].exif_info, None);
        assert_eq!(records[2].parent_oid, 9);
        assert_eq!(records[2].parent_globalid, None);
        assert_eq!(records[2].url, None);
    }
}
