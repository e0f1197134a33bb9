//! Geometry translation between the feature service's native JSON encoding
//! and GeoJSON.
//!
//! The feature service describes geometry structurally (`{x, y}`, `points`,
//! `paths`, `rings`) while GeoJSON uses a declared `type` plus nested
//! `coordinates`. The native side is modelled here and the GeoJSON side uses
//! the `geojson` crate's document types. The crate provides the pure
//! conversions between them and maps a GeoJSON geometry kind to the geometry
//! type requested from the spatial-format loader.
//!
//! # Example
//!
//! ```rust
//! use feature_sync_geometry::{to_interchange, to_native, EsriGeometry, GeoJsonValue};
//!
//! let native = EsriGeometry::Polyline(vec![vec![vec![0.0, 0.0], vec![1.0, 1.0]]]);
//! let geojson = to_interchange(&native);
//! assert!(matches!(geojson, GeoJsonValue::LineString(_)));
//! assert_eq!(to_native(&geojson).unwrap(), native);
//! ```

mod error;
mod esri;
mod interchange;
mod loader_type;
mod translate;

pub use error::GeometryError;
pub use esri::{EsriFeature, EsriGeometry};
pub use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
pub use interchange::{
    collection, collection_kind, feature, parse_geometry, parse_geometry_str, GeometryKind,
};
pub use loader_type::LoaderGeometryType;
pub use translate::{esri_features_to_collection, geojson_to_native, to_interchange, to_native};

/// A single coordinate tuple. Two values for XY, extra values (Z, M) are
/// carried through untouched.
pub type Position = Vec<f64>;
