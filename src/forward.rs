//! Feature service -> PostgreSQL batch transfer.

use crate::config::ForwardConfig;
use crate::loader::SpatialLoader;
use crate::progress::Progress;
use crate::srs::{resolve_source, SourceSrid};
use anyhow::{Context, Result};
use feature_sync_geometry::{collection_kind, esri_features_to_collection, LoaderGeometryType};
use feature_sync_postgresql::{prepare, PrepareOptions, PrepareOutcome, TableDescriptor, TableStore};
use feature_sync_service::{FeatureService, LayerMetadata};

/// Totals reported at the end of a paginated transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub total_imported: usize,
    pub pages: usize,
}

/// Fail when the configured object-id column already exists on the layer.
pub fn check_oid_column(metadata: &LayerMetadata, oid_column: &str) -> Result<()> {
    if let Some(field) = metadata.field(oid_column) {
        anyhow::bail!(
            "Field {} already exists in the service. Define a unique field to be used for the OID.",
            field.name
        );
    }
    Ok(())
}

/// Build the destination descriptor for a layer: geometry only when the
/// layer has one, source spatial reference resolved from the configuration
/// or the layer extent.
pub async fn describe_destination(
    config: &ForwardConfig,
    metadata: &LayerMetadata,
    progress: &Progress,
) -> TableDescriptor {
    let table = TableDescriptor::new(&config.schema, &config.table, &config.oid_column);
    if !metadata.has_geometry() {
        progress
            .debug(format!("{} has no geometry, loading attributes only", config.layer_url))
            .await;
        return table;
    }

    let source = resolve_source(config.source_srid, metadata);
    match source {
        SourceSrid::Unresolved => {
            progress
                .warn("No source_epsg was provided and it could not be discovered from the services metadata.")
                .await
        }
        SourceSrid::Discovered(srid) => {
            progress
                .debug(format!("Discovered source spatial reference {srid}"))
                .await
        }
        SourceSrid::Explicit(_) | SourceSrid::NotApplicable => {}
    }

    table
        .with_geometry(&config.geometry_column)
        .with_srids(source.srid(), config.target_srid)
}

/// Empty the destination table, then page through the layer and hand every
/// page to the loader.
///
/// Rows loaded before a failure stay in the table.
pub async fn download_features(
    service: &dyn FeatureService,
    store: &dyn TableStore,
    loader: &dyn SpatialLoader,
    layer_url: &str,
    table: &TableDescriptor,
    batch_size: usize,
    progress: &Progress,
) -> Result<TransferSummary> {
    progress.info("Starting download feature records").await;

    let outcome = prepare(store, &table.schema, &table.table, PrepareOptions::full_reset())
        .await
        .with_context(|| format!("Failed to prepare {}", table.display_name()))?;
    report_prepare(progress, table, outcome).await;

    let mut offset = 0;
    let mut summary = TransferSummary::default();

    loop {
        let features = service
            .query(layer_url, offset, batch_size)
            .await
            .with_context(|| format!("Failed to fetch features from {layer_url} at offset {offset}"))?
            .into_features();
        if features.is_empty() {
            progress.debug("No more data").await;
            break;
        }

        progress
            .info(format!("Processing batch from offset {offset}, size {batch_size}."))
            .await;
        progress.info(format!("Features in batch: {}", features.len())).await;

        let document = esri_features_to_collection(features);
        let geometry_type = if table.has_geometry() {
            LoaderGeometryType::for_kind(collection_kind(&document))
        } else {
            LoaderGeometryType::None
        };

        loader
            .load(&document, table, geometry_type)
            .await
            .with_context(|| format!("Failed to load batch at offset {offset} into {}", table.display_name()))?;

        let processed = document.features.len();
        summary.total_imported += processed;
        summary.pages += 1;
        offset += processed;

        progress
            .debug(format!("Processed {processed} features in current batch."))
            .await;
        progress
            .debug(format!("Total processed: {}", summary.total_imported))
            .await;

        if processed < batch_size {
            progress.debug("Last batch processed").await;
            break;
        }
    }

    progress.info("Finished download feature records").await;
    progress
        .info(format!("Total features imported: {}", summary.total_imported))
        .await;
    Ok(summary)
}

pub(crate) async fn report_prepare(
    progress: &Progress,
    table: &TableDescriptor,
    outcome: PrepareOutcome,
) {
    let name = table.display_name();
    match outcome {
        PrepareOutcome::Missing => {
            progress.debug(format!("Table {name} does not exist.")).await
        }
        PrepareOutcome::Created => progress.debug(format!("Created table {name}")).await,
        PrepareOutcome::Truncated => progress.debug(format!("Truncated table {name}")).await,
        PrepareOutcome::Deleted {
            sequence_reset_skipped,
        } => {
            progress
                .warn(format!(
                    "Table {name} is referenced by a foreign key; rows were deleted instead of truncated"
                ))
                .await;
            if sequence_reset_skipped {
                progress
                    .warn(format!("Sequences of {name} were not reset"))
                    .await;
            }
        }
    }
}
