//! Whole runs as started by the CLI: each one chains the steps of a request
//! and turns failures into progress lines plus a returned error.

use crate::attachments::{download_attachments, sync_attachments, SyncSummary};
use crate::config::ForwardConfig;
use crate::forward::{check_oid_column, describe_destination, download_features, TransferSummary};
use crate::loader::SpatialLoader;
use crate::progress::Progress;
use anyhow::{Context, Result};
use feature_sync_bucket::ObjectBucket;
use feature_sync_postgresql::{AttachmentStore, ParentKey};
use feature_sync_service::FeatureService;

/// What an `agol2pg` run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgolToPgSummary {
    pub features: TransferSummary,
    pub attachments: Option<TransferSummary>,
    /// `None` when attachments were not relocated or relocation failed
    pub relocated: Option<SyncSummary>,
}

/// Feature service -> PostgreSQL, optionally followed by the attachment
/// records and the relocation of their content to `bucket`.
///
/// A relocation failure is reported but does not fail the run.
pub async fn agol_to_pg<S: AttachmentStore>(
    service: &dyn FeatureService,
    store: &S,
    loader: &dyn SpatialLoader,
    bucket: Option<&dyn ObjectBucket>,
    config: &ForwardConfig,
    progress: &Progress,
) -> Result<AgolToPgSummary> {
    progress.info("Starting feature service to PostgreSQL transfer").await;
    let result = run_agol_to_pg(service, store, loader, bucket, config, progress).await;
    match &result {
        Ok(_) => {
            progress
                .info("Finished feature service to PostgreSQL transfer")
                .await
        }
        Err(e) => progress.error(format!("An error occurred: {e:#}")).await,
    }
    result
}

async fn run_agol_to_pg<S: AttachmentStore>(
    service: &dyn FeatureService,
    store: &S,
    loader: &dyn SpatialLoader,
    bucket: Option<&dyn ObjectBucket>,
    config: &ForwardConfig,
    progress: &Progress,
) -> Result<AgolToPgSummary> {
    config.validate()?;
    service
        .authenticate()
        .await
        .context("Failed to obtain token")?;

    let metadata = service
        .metadata(&config.layer_url)
        .await
        .with_context(|| format!("Failed to fetch metadata from {}", config.layer_url))?;
    check_oid_column(&metadata, &config.oid_column)?;

    let table = describe_destination(config, &metadata, progress).await;
    progress.debug(format!("Destination: {table:?}")).await;

    let features = download_features(
        service,
        store,
        loader,
        &config.layer_url,
        &table,
        config.batch_size,
        progress,
    )
    .await?;

    let mut summary = AgolToPgSummary {
        features,
        ..Default::default()
    };
    if !config.save_attachments {
        return Ok(summary);
    }

    let key = ParentKey::resolve(metadata.global_id_field(), metadata.object_id_field());
    summary.attachments = Some(
        download_attachments(
            service,
            store,
            &config.layer_url,
            &table,
            &key,
            config.batch_size,
            progress,
        )
        .await?,
    );

    match bucket {
        Some(bucket) => match sync_attachments(store, service, bucket, &table, progress).await {
            Ok(relocated) => summary.relocated = Some(relocated),
            Err(e) => {
                progress
                    .error(format!("Attachment transfer failed: {e:#}"))
                    .await
            }
        },
        None => {
            progress
                .warn("No bucket configured, attachment content was not relocated")
                .await
        }
    }
    Ok(summary)
}
