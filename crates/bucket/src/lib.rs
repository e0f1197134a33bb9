//! Object storage used for attachment content and archive snapshots
//!
//! Both pipelines that touch storage work against the [`ObjectBucket`] trait,
//! which covers exactly what they need: listing under a prefix, writing an
//! object from memory or from a local file, deleting, and building the
//! canonical URL of an object.
//!
//! # Locations
//!
//! - **S3**: `s3://bucket` or a bare bucket name (`my-bucket`)
//! - **Local**: a directory path (`/srv/attachments`, `./out`) or
//!   `file:///srv/attachments`
//!
//! # Example
//!
//! ```ignore
//! use feature_sync_bucket::BucketLocation;
//!
//! let bucket = BucketLocation::parse("s3://gis-attachments")?.open().await?;
//! for object in bucket.list("parcels/").await? {
//!     println!("{} ({} bytes)", object.name, object.size);
//! }
//! ```

mod local;
mod s3;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use local::LocalBucket;
pub use s3::S3Bucket;

/// An object stored in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketObject {
    /// Full object name, including any `table/` prefix
    pub name: String,
    pub size: u64,
}

/// Storage capability shared by the attachment synchronizer and the backup
/// archiver.
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    /// Name used in progress and log lines.
    fn display_name(&self) -> String;

    /// List every object whose name starts with `prefix` (recursively).
    async fn list(&self, prefix: &str) -> Result<Vec<BucketObject>>;

    /// Upload a local file as object `name`, streaming its content.
    async fn upload_file(&self, name: &str, path: &Path) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Canonical URL under which an object is referenced from the database.
    fn object_url(&self, name: &str) -> String;
}

/// Where a bucket lives, parsed from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketLocation {
    /// Local directory acting as a bucket
    Local(PathBuf),
    /// S3 bucket
    S3 { bucket: String },
}

impl BucketLocation {
    /// Parse a location, auto-detecting its kind
    ///
    /// - `s3://bucket` -> S3
    /// - `file://path`, absolute or `.`-relative paths -> Local
    /// - Everything else is taken as a bare S3 bucket name
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            anyhow::bail!("Bucket location must not be empty");
        }

        if let Some(rest) = uri.strip_prefix("s3://") {
            let bucket = parse_s3_bucket(rest)?;
            Ok(BucketLocation::S3 { bucket })
        } else if let Some(path) = uri.strip_prefix("file://") {
            Ok(BucketLocation::Local(PathBuf::from(path)))
        } else if uri.starts_with('/') || uri.starts_with('.') {
            Ok(BucketLocation::Local(PathBuf::from(uri)))
        } else {
            let bucket = parse_s3_bucket(uri)?;
            Ok(BucketLocation::S3 { bucket })
        }
    }

    /// Connect to the bucket.
    pub async fn open(&self) -> Result<Box<dyn ObjectBucket>> {
        match self {
            BucketLocation::Local(path) => {
                tokio::fs::create_dir_all(path)
                    .await
                    .with_context(|| format!("Failed to create bucket directory: {}", path.display()))?;
                Ok(Box::new(LocalBucket::new(path.clone())))
            }
            BucketLocation::S3 { bucket } => Ok(Box::new(S3Bucket::connect(bucket).await?)),
        }
    }

    /// Get a display name for logging
    pub fn display_name(&self) -> String {
        match self {
            BucketLocation::Local(path) => path.display().to_string(),
            BucketLocation::S3 { bucket } => format!("s3://{bucket}"),
        }
    }
}

fn parse_s3_bucket(s: &str) -> Result<String> {
    let bucket = s.trim_end_matches('/');
    if bucket.is_empty() {
        anyhow::bail!("S3 location must name a bucket");
    }
    if bucket.contains('/') {
        anyhow::bail!("S3 location must be a bucket without a key: '{s}'");
    }
    Ok(bucket.to_string())
}
