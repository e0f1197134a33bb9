//! Per-pipeline configuration.
//!
//! The CLI builds one of these per run; library callers can start from
//! `Default` and override what they need.

mod duration;

pub use duration::parse_duration_to_days;

use std::path::PathBuf;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_OID_COLUMN: &str = "agol_to_pg_oid";
pub const DEFAULT_GEOMETRY_COLUMN: &str = "geom";
pub const DEFAULT_FORWARD_BATCH: usize = 1000;
pub const DEFAULT_REVERSE_BATCH: usize = 100;
pub const DEFAULT_REVERSE_TARGET_SRID: i64 = 3857;
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Feature service -> PostgreSQL.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// PostgreSQL service name
    pub service: String,

    /// Feature layer URL (`.../FeatureServer/<n>`)
    pub layer_url: String,

    pub schema: String,
    pub table: String,

    /// Object-id column created by the loader; must not exist on the layer
    pub oid_column: String,

    /// Geometry column name used when the layer has geometry
    pub geometry_column: String,

    pub batch_size: usize,

    /// Overrides the layer's advertised spatial reference
    pub source_srid: Option<i64>,

    /// Reproject to this spatial reference; `None` keeps the source one
    pub target_srid: Option<i64>,

    /// Also download attachments and relocate their content to `bucket`
    pub save_attachments: bool,
    pub bucket: Option<String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            layer_url: String::new(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: String::new(),
            oid_column: DEFAULT_OID_COLUMN.to_string(),
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
            batch_size: DEFAULT_FORWARD_BATCH,
            source_srid: None,
            target_srid: None,
            save_attachments: false,
            bucket: None,
        }
    }
}

impl ForwardConfig {
    /// Reject incomplete configurations before any work starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.service.is_empty()
            || self.layer_url.is_empty()
            || self.table.is_empty()
            || self.oid_column.is_empty()
        {
            anyhow::bail!("Missing required parameters (service, url, table, oid)");
        }
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than zero");
        }
        if self.save_attachments && self.bucket.as_deref().unwrap_or_default().is_empty() {
            anyhow::bail!("Missing required parameter (bucket) for saving attachments");
        }
        Ok(())
    }
}

/// Relocating attachment content from a table to a bucket.
#[derive(Debug, Clone)]
pub struct AttachmentSyncConfig {
    pub service: String,
    pub schema: String,
    pub table: String,
    pub bucket: String,
}

impl Default for AttachmentSyncConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: String::new(),
            bucket: String::new(),
        }
    }
}

/// PostgreSQL -> feature service.
#[derive(Debug, Clone)]
pub struct ReverseConfig {
    pub service: String,
    pub schema: String,
    pub table: String,

    /// Existing layer URL; when absent or missing a new service is created
    pub layer_url: Option<String>,

    pub geometry_column: String,

    /// Columns never sent
    pub ignore: Vec<String>,

    pub target_srid: i64,
    pub batch_size: usize,

    /// Delete every remote feature before the first batch
    pub truncate: bool,
}

impl Default for ReverseConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: String::new(),
            layer_url: None,
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
            ignore: Vec::new(),
            target_srid: DEFAULT_REVERSE_TARGET_SRID,
            batch_size: DEFAULT_REVERSE_BATCH,
            truncate: false,
        }
    }
}

impl ReverseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.service.is_empty() || self.table.is_empty() {
            anyhow::bail!("Missing required parameters (service, table)");
        }
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than zero");
        }
        Ok(())
    }
}

/// Archiving hosted feature services.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Owners whose feature services are archived
    pub owners: Vec<String>,

    pub max_items: usize,

    /// Prune archives older than `duration_days`
    pub remove_archives: bool,
    pub duration_days: Option<i64>,

    /// Where exports are downloaded before upload; a temporary directory
    /// when unset
    pub download_dir: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            max_items: DEFAULT_MAX_ITEMS,
            remove_archives: false,
            duration_days: None,
            download_dir: None,
        }
    }
}

impl BackupConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.owners.is_empty() {
            anyhow::bail!("At least one owner is required");
        }
        if self.remove_archives && self.duration_days.is_none() {
            anyhow::bail!("Duration (days) is required when removing archives");
        }
        if let Some(days) = self.duration_days {
            if days < 0 || chrono::TimeDelta::try_days(days).is_none() {
                anyhow::bail!("Duration of {days} days is out of range");
            }
        }
        Ok(())
    }
}
