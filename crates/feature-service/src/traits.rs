//! Capability traits implemented by the REST client and by test doubles.

use crate::error::ServiceError;
use crate::metadata::LayerMetadata;
use crate::portal::{ExportFormat, PortalItem, ServiceDefinition};
use crate::query::{ApplyEditsResponse, AttachmentPage, QueryPage};
use async_trait::async_trait;
use feature_sync_geometry::EsriFeature;
use std::path::{Path, PathBuf};

/// Operations against a single feature layer.
#[async_trait]
pub trait FeatureService: Send + Sync {
    /// Obtain (or validate) the access token used by later requests.
    async fn authenticate(&self) -> Result<(), ServiceError>;

    async fn metadata(&self, layer_url: &str) -> Result<LayerMetadata, ServiceError>;

    /// Whether the layer answers its metadata request.
    async fn layer_exists(&self, layer_url: &str) -> Result<bool, ServiceError> {
        match self.metadata(layer_url).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch `count` features starting at `offset`, all fields, no filter.
    async fn query(
        &self,
        layer_url: &str,
        offset: usize,
        count: usize,
    ) -> Result<QueryPage, ServiceError>;

    /// Fetch attachment groups starting at `offset`, with retrieval URLs.
    async fn query_attachments(
        &self,
        layer_url: &str,
        offset: usize,
        count: usize,
    ) -> Result<AttachmentPage, ServiceError>;

    /// Stream raw content, e.g. an attachment retrieval URL, into `dest`.
    /// Returns the number of bytes written.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, ServiceError>;

    async fn add_features(
        &self,
        layer_url: &str,
        features: &[EsriFeature],
    ) -> Result<ApplyEditsResponse, ServiceError>;

    /// Delete every feature in the layer (`where=1=1`).
    async fn delete_all(&self, layer_url: &str) -> Result<(), ServiceError>;
}

/// Operations against the portal's content catalog.
#[async_trait]
pub trait Portal: Send + Sync {
    /// Search items, newest modification first, returning at most
    /// `max_items` results.
    async fn search(&self, query: &str, max_items: usize)
        -> Result<Vec<PortalItem>, ServiceError>;

    /// Export an item and wait for the export job; returns the export item.
    async fn export_item(
        &self,
        item: &PortalItem,
        title: &str,
        format: ExportFormat,
    ) -> Result<PortalItem, ServiceError>;

    /// Download an item's data into `dir`, returning the written path.
    async fn download_item(&self, item: &PortalItem, dir: &Path)
        -> Result<PathBuf, ServiceError>;

    async fn delete_item(&self, item: &PortalItem) -> Result<(), ServiceError>;

    /// Create a hosted feature service with one layer; returns the layer URL.
    async fn create_service(&self, definition: &ServiceDefinition)
        -> Result<String, ServiceError>;
}
