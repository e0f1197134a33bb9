//! Spatial-format loader: writes one GeoJSON page into a PostGIS table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use feature_sync_geometry::{FeatureCollection, LoaderGeometryType};
use feature_sync_postgresql::{TableDescriptor, SERVICE_FILE_ENV};
use std::io::Write;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Appends an interchange document to a destination table.
#[async_trait]
pub trait SpatialLoader: Send + Sync {
    async fn load(
        &self,
        document: &FeatureCollection,
        table: &TableDescriptor,
        geometry_type: LoaderGeometryType,
    ) -> Result<()>;
}

/// [`SpatialLoader`] backed by GDAL's `ogr2ogr`.
#[derive(Debug, Clone)]
pub struct Ogr2OgrLoader {
    /// PostgreSQL service name passed in the `PG:` connection string
    service: String,
    service_file: Option<PathBuf>,
    program: PathBuf,
}

impl Ogr2OgrLoader {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            service_file: None,
            program: PathBuf::from("ogr2ogr"),
        }
    }

    /// Forward this service file to the loader as `PGSERVICEFILE`.
    pub fn with_service_file(mut self, path: Option<PathBuf>) -> Self {
        self.service_file = path;
        self
    }

    pub fn with_program(mut self, program: PathBuf) -> Self {
        self.program = program;
        self
    }

    /// Command-line arguments for loading `file` into `table`.
    pub fn arguments(
        &self,
        file: &str,
        table: &TableDescriptor,
        geometry_type: LoaderGeometryType,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-progress".into(),
            "--config".into(),
            "PG_USE_COPY".into(),
            "YES".into(),
            "-f".into(),
            "PostgreSQL".into(),
            format!(
                "PG:service={} sslmode=disable active_schema={}",
                self.service, table.schema
            ),
            file.to_string(),
            "-append".into(),
            "-lco".into(),
            format!("FID={}", table.oid_column),
            "-nln".into(),
            format!("{}.{}", table.schema, table.table),
        ];

        let nlt = match &table.geometry_column {
            Some(geometry) => {
                args.extend([
                    "-lco".into(),
                    format!("GEOMETRY_NAME={geometry}"),
                    "-lco".into(),
                    "GEOMETRY_TYPE=geometry".into(),
                    "-lco".into(),
                    "DIM=2".into(),
                ]);
                if let Some(source) = table.source_srid {
                    args.extend(["-a_srs".into(), format!("EPSG:{source}")]);
                }
                if let Some(target) = table.target_srid {
                    args.extend(["-t_srs".into(), format!("EPSG:{target}")]);
                }
                geometry_type
            }
            None => LoaderGeometryType::None,
        };
        args.extend(["-nlt".into(), nlt.as_str().to_string()]);
        args
    }
}

/// Write a page to a temporary `.geojson` file, removed when dropped.
async fn write_document(document: &FeatureCollection) -> Result<tempfile::NamedTempFile> {
    let body = serde_json::to_vec(document).context("Failed to encode GeoJSON page")?;
    tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("page-")
            .suffix(".geojson")
            .tempfile()
            .context("Failed to create temporary GeoJSON file")?;
        file.write_all(&body).context("Failed to write GeoJSON page")?;
        file.flush().context("Failed to flush GeoJSON page")?;
        Ok(file)
    })
    .await
    .context("GeoJSON writer task failed")?
}

#[async_trait]
impl SpatialLoader for Ogr2OgrLoader {
    async fn load(
        &self,
        document: &FeatureCollection,
        table: &TableDescriptor,
        geometry_type: LoaderGeometryType,
    ) -> Result<()> {
        let file = write_document(document).await?;
        let path = file.path().to_string_lossy().to_string();
        let args = self.arguments(&path, table, geometry_type);
        info!("Running {} {}", self.program.display(), args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&args);
        if let Some(service_file) = &self.service_file {
            command.env(SERVICE_FILE_ENV, service_file);
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.program.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "ogr2ogr exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!(
            "ogr2ogr loaded {} features into {}",
            document.features.len(),
            table.display_name()
        );
        Ok(())
    }
}
