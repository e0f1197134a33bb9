//! PostgreSQL -> feature service transfer.

use crate::config::ReverseConfig;
use crate::progress::Progress;
use anyhow::{Context, Result};
use feature_sync_geometry::{geojson_to_native, EsriFeature};
use feature_sync_postgresql::{esri_geometry_type, field_definitions, RowSource, SourceRow};
use feature_sync_service::{FeatureService, FieldInfo, Portal, ServiceDefinition};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReverseSummary {
    /// Features in batches the service accepted
    pub submitted: usize,
    pub failed_batches: usize,
    pub batches: usize,
}

/// Turn a row into a feature: identifier attributes are dropped and the
/// GeoJSON geometry converted to the service encoding.
pub fn row_to_feature(
    row: SourceRow,
    primary_key: Option<&str>,
    ignore: &[String],
) -> Result<EsriFeature> {
    let attributes = row
        .attributes
        .into_iter()
        .filter(|(name, _)| {
            !name.eq_ignore_ascii_case("objectid")
                && Some(name.as_str()) != primary_key
                && !ignore.contains(name)
        })
        .collect();
    let geometry = match &row.geometry {
        Some(value) => geojson_to_native(value).context("Failed to convert row geometry")?,
        None => None,
    };
    Ok(EsriFeature {
        attributes,
        geometry,
    })
}

/// Find the target layer, creating a hosted service for the table when the
/// configured layer is absent or does not exist.
pub async fn resolve_layer(
    service: &dyn FeatureService,
    portal: &dyn Portal,
    source: &dyn RowSource,
    config: &ReverseConfig,
    progress: &Progress,
) -> Result<String> {
    if let Some(url) = &config.layer_url {
        if service
            .layer_exists(url)
            .await
            .with_context(|| format!("Failed to check layer {url}"))?
        {
            return Ok(url.clone());
        }
        progress
            .info(format!("Layer {url} not found, creating a new feature service"))
            .await;
    }

    let primary_key = source.primary_key(&config.schema, &config.table).await?;
    let columns = source.columns(&config.schema, &config.table).await?;
    let fields = field_definitions(
        &columns,
        primary_key.as_deref(),
        &config.geometry_column,
        &config.ignore,
    );
    let postgis_type = source
        .geometry_type(&config.schema, &config.table, &config.geometry_column)
        .await?;

    let definition = ServiceDefinition {
        name: format!("{}_Feature_Service", config.table),
        description: format!(
            "A feature service containing data from {}.{}",
            config.schema, config.table
        ),
        layer_name: config.table.clone(),
        geometry_type: esri_geometry_type(postgis_type.as_deref()).to_string(),
        fields: fields
            .into_iter()
            .map(|f| FieldInfo {
                name: f.name,
                field_type: f.field_type.to_string(),
                alias: Some(f.alias),
            })
            .collect(),
        wkid: Some(config.target_srid),
    };
    let url = portal
        .create_service(&definition)
        .await
        .with_context(|| format!("Failed to create service {}", definition.name))?;
    progress.info(format!("Created feature layer {url}")).await;
    Ok(url)
}

/// Publish a table's rows to a feature layer in fixed-size batches.
///
/// Authentication failures abort before anything is read. A failed batch is
/// reported and the remaining batches are still sent.
pub async fn transfer_to_service(
    service: &dyn FeatureService,
    portal: &dyn Portal,
    source: &dyn RowSource,
    config: &ReverseConfig,
    progress: &Progress,
) -> Result<ReverseSummary> {
    config.validate()?;
    if let Err(e) = service.authenticate().await {
        progress.error(format!("Failed to obtain token: {e}")).await;
        return Err(e).context("Failed to obtain token");
    }

    let layer_url = resolve_layer(service, portal, source, config, progress).await?;

    if config.truncate {
        progress.info("Deleting all existing features...").await;
        if let Err(e) = service.delete_all(&layer_url).await {
            progress
                .error(format!("Failed to delete features: {e}"))
                .await;
        }
    } else {
        progress
            .info("No truncate requested. Appending features without deleting existing ones.")
            .await;
    }

    let primary_key = source.primary_key(&config.schema, &config.table).await?;
    let columns = source.columns(&config.schema, &config.table).await?;
    let has_geometry = columns.iter().any(|c| c.name == config.geometry_column);
    let read: Vec<String> = columns
        .into_iter()
        .map(|c| c.name)
        .filter(|name| *name != config.geometry_column && !config.ignore.contains(name))
        .collect();

    let rows = source
        .read_rows(
            &config.schema,
            &config.table,
            &read,
            has_geometry.then_some(config.geometry_column.as_str()),
            config.target_srid,
        )
        .await
        .with_context(|| format!("Failed to read {}.{}", config.schema, config.table))?;

    let features = rows
        .into_iter()
        .map(|row| row_to_feature(row, primary_key.as_deref(), &config.ignore))
        .collect::<Result<Vec<_>>>()?;

    let total = features.len();
    let mut summary = ReverseSummary::default();
    for (index, batch) in features.chunks(config.batch_size).enumerate() {
        let start = index * config.batch_size;
        let end = start + batch.len();
        summary.batches += 1;

        match service.add_features(&layer_url, batch).await {
            Ok(response) => {
                summary.submitted += batch.len();
                if response.failed() > 0 {
                    progress
                        .warn(format!(
                            "{} of {} features in {start} to {end} were rejected: {}",
                            response.failed(),
                            batch.len(),
                            response.first_error().unwrap_or_default()
                        ))
                        .await;
                }
                progress
                    .info(format!("Successfully added features {start} to {end} of {total}"))
                    .await;
            }
            Err(e) => {
                summary.failed_batches += 1;
                progress
                    .error(format!("Failed to add features {start} to {end} of {total}: {e}"))
                    .await;
            }
        }
    }

    progress
        .info(format!(
            "Submitted {} features in {} batches ({} failed)",
            summary.submitted, summary.batches, summary.failed_batches
        ))
        .await;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_sync_geometry::EsriGeometry;
    use serde_json::json;

    #[test]
    fn test_row_to_feature_strips_identifiers() {
        let row = SourceRow {
            attributes: json!({"id": 4, "OBJECTID": 9, "name": "Lot 4", "secret": "x"})
                .as_object()
                .unwrap()
                .clone(),
            geometry: Some(json!({"type": "Point", "coordinates": [174.7, -36.8]})),
        };

        let feature = row_to_feature(row, Some("id"), &["secret".to_string()]).unwrap();
        assert_eq!(feature.attributes.len(), 1);
        assert_eq!(feature.attributes["name"], json!("Lot 4"));
        assert_eq!(
            feature.geometry,
            Some(EsriGeometry::Point(vec![174.7, -36.8]))
        );
    }

    #[test]
    fn test_row_without_geometry() {
        let row = SourceRow {
            attributes: json!({"name": "Owner"}).as_object().unwrap().clone(),
            geometry: None,
        };
        let feature = row_to_feature(row, None, &[]).unwrap();
        assert!(feature.geometry.is_none());
    }

    #[test]
    fn test_unsupported_geometry_is_error() {
        let row = SourceRow {
            attributes: Default::default(),
            geometry: Some(json!({"type": "GeometryCollection", "geometries": []})),
        };
        assert!(row_to_feature(row, None, &[]).is_err());
    }
}
