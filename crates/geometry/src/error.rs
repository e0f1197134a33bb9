//! Error types for geometry translation.

use thiserror::Error;

/// Errors that can occur while decoding or translating geometries.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// GeoJSON geometry declared a type this crate does not handle
    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometryType(String),

    /// GeoJSON geometry object had no `type` member
    #[error("Geometry is missing its 'type' member")]
    MissingType,

    /// Coordinates did not match the shape required by the declared type
    #[error("Invalid coordinates for {kind}: {source}")]
    InvalidCoordinates {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Input was not valid JSON
    #[error("Invalid geometry JSON: {0}")]
    Json(#[from] serde_json::Error),
}
