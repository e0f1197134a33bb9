//! GeoJSON documents used as the transfer-neutral representation.
//!
//! Documents are plain [`geojson`] types. Geometries read back from the store
//! go through [`parse_geometry`], which accepts the declared `type` in any
//! case and only the six simple kinds.

use crate::error::GeometryError;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoJsonValue};
use serde_json::Value;
use std::fmt;

/// The declared kind of a GeoJSON geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    /// GeoJSON spelling of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    /// Parse a declared type, ignoring case.
    pub fn parse(declared: &str) -> Option<Self> {
        match declared.to_uppercase().as_str() {
            "POINT" => Some(GeometryKind::Point),
            "MULTIPOINT" => Some(GeometryKind::MultiPoint),
            "LINESTRING" => Some(GeometryKind::LineString),
            "MULTILINESTRING" => Some(GeometryKind::MultiLineString),
            "POLYGON" => Some(GeometryKind::Polygon),
            "MULTIPOLYGON" => Some(GeometryKind::MultiPolygon),
            _ => None,
        }
    }

    /// Kind of a geometry value; `None` for geometry collections.
    pub fn of(value: &GeoJsonValue) -> Option<Self> {
        match value {
            GeoJsonValue::Point(_) => Some(GeometryKind::Point),
            GeoJsonValue::MultiPoint(_) => Some(GeometryKind::MultiPoint),
            GeoJsonValue::LineString(_) => Some(GeometryKind::LineString),
            GeoJsonValue::MultiLineString(_) => Some(GeometryKind::MultiLineString),
            GeoJsonValue::Polygon(_) => Some(GeometryKind::Polygon),
            GeoJsonValue::MultiPolygon(_) => Some(GeometryKind::MultiPolygon),
            GeoJsonValue::GeometryCollection(_) => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a geometry from a JSON value such as the output of
/// `ST_AsGeoJSON`.
pub fn parse_geometry(value: &Value) -> Result<Geometry, GeometryError> {
    let declared = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(GeometryError::MissingType)?;
    let kind = GeometryKind::parse(declared)
        .ok_or_else(|| GeometryError::UnsupportedGeometryType(declared.to_string()))?;

    let mut normalized = value.clone();
    normalized["type"] = Value::from(kind.as_str());
    serde_json::from_value(normalized).map_err(|source| GeometryError::InvalidCoordinates {
        kind: kind.to_string(),
        source,
    })
}

/// Decode a geometry from its JSON text.
pub fn parse_geometry_str(text: &str) -> Result<Geometry, GeometryError> {
    let value: Value = serde_json::from_str(text)?;
    parse_geometry(&value)
}

/// A feature with the given properties. `geometry` serializes as `null`
/// when absent.
pub fn feature(properties: JsonObject, geometry: Option<GeoJsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: geometry.map(Geometry::new),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Kind of the first feature carrying a geometry.
///
/// All features of one layer share a kind, so the first one speaks for the
/// page.
pub fn collection_kind(collection: &FeatureCollection) -> Option<GeometryKind> {
    collection
        .features
        .iter()
        .find_map(|f| f.geometry.as_ref().and_then(|g| GeometryKind::of(&g.value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_declared_type_is_case_insensitive() {
        let geometry =
            parse_geometry(&json!({"type": "multipoint", "coordinates": [[1.0, 2.0]]})).unwrap();
        assert_eq!(geometry.value, GeoJsonValue::MultiPoint(vec![vec![1.0, 2.0]]));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = parse_geometry(&json!({"type": "GeometryCollection", "geometries": []}))
            .unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedGeometryType(ref t) if t == "GeometryCollection"));
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let err = parse_geometry(&json!({"coordinates": [1.0, 2.0]})).unwrap_err();
        assert!(matches!(err, GeometryError::MissingType));
    }

    #[test]
    fn test_wrong_coordinate_shape_is_rejected() {
        let err = parse_geometry_str(r#"{"type":"Polygon","coordinates":[1.0,2.0]}"#).unwrap_err();
        assert!(matches!(err, GeometryError::InvalidCoordinates { .. }));
    }

    #[test]
    fn test_collection_document_shape() {
        let properties = json!({"name": "a"}).as_object().cloned().unwrap();
        let document = collection(vec![feature(properties, None)]);
        let value = serde_json::to_value(&document).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        let first = &value["features"][0];
        assert_eq!(first["type"], "Feature");
        assert_eq!(first["properties"], json!({"name": "a"}));
        assert!(first["geometry"].is_null());
    }

    #[test]
    fn test_collection_kind_skips_missing_geometries() {
        let document = collection(vec![
            feature(JsonObject::new(), None),
            feature(
                JsonObject::new(),
                Some(GeoJsonValue::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0]])),
            ),
        ]);
        assert_eq!(collection_kind(&document), Some(GeometryKind::LineString));
        assert_eq!(collection_kind(&collection(Vec::new())), None);
    }
}
