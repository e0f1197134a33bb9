//! Client for hosted feature services and the portal that owns them.
//!
//! The pipelines only depend on the [`FeatureService`] and [`Portal`]
//! traits; [`ArcGisClient`] is the REST implementation used in production.
//!
//! # Example
//!
//! ```ignore
//! use feature_sync_service::{ArcGisClient, Credentials, FeatureService};
//!
//! let client = ArcGisClient::new("https://www.arcgis.com", Credentials::Anonymous)?;
//! let metadata = client.metadata("https://services.arcgis.com/x/arcgis/rest/services/Parcels/FeatureServer/0").await?;
//! let page = client.query(&layer, 0, 1000).await?;
//! ```

mod client;
mod error;
mod metadata;
mod portal;
mod query;
mod traits;

pub use client::{admin_url, ArcGisClient, DEFAULT_PORTAL_URL};
pub use error::ServiceError;
pub use metadata::{Extent, FieldInfo, LayerMetadata, SpatialReference};
pub use portal::{
    feature_services_owned_by, Credentials, ExportFormat, PortalItem, ServiceDefinition,
};
pub use query::{
    ApplyEditsResponse, AttachmentGroup, AttachmentInfo, AttachmentPage, EditError, EditResult,
    QueryPage,
};
pub use traits::{FeatureService, Portal};
