//! Native feature-service geometry and feature records.

use crate::Position;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Geometry as encoded by the feature service.
///
/// The encoding carries no type tag; the kind is implied by which member is
/// present (`x`/`y`, `points`, `paths` or `rings`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EsriRepr", into = "EsriRepr")]
pub enum EsriGeometry {
    /// `{x, y[, z]}`
    Point(Position),
    /// `{points: [[x, y], ...]}`
    Multipoint(Vec<Position>),
    /// `{paths: [[[x, y], ...], ...]}`
    Polyline(Vec<Vec<Position>>),
    /// `{rings: [[[x, y], ...], ...]}`
    Polygon(Vec<Vec<Position>>),
}

// Variant order matters: serde tries them top to bottom.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum EsriRepr {
    Point {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        z: Option<f64>,
    },
    Multipoint {
        points: Vec<Position>,
    },
    Polyline {
        paths: Vec<Vec<Position>>,
    },
    Polygon {
        rings: Vec<Vec<Position>>,
    },
}

impl From<EsriRepr> for EsriGeometry {
    fn from(repr: EsriRepr) -> Self {
        match repr {
            EsriRepr::Point { x, y, z } => {
                let mut position = vec![x, y];
                position.extend(z);
                EsriGeometry::Point(position)
            }
            EsriRepr::Multipoint { points } => EsriGeometry::Multipoint(points),
            EsriRepr::Polyline { paths } => EsriGeometry::Polyline(paths),
            EsriRepr::Polygon { rings } => EsriGeometry::Polygon(rings),
        }
    }
}

impl From<EsriGeometry> for EsriRepr {
    fn from(geometry: EsriGeometry) -> Self {
        match geometry {
            EsriGeometry::Point(position) => EsriRepr::Point {
                x: position.first().copied().unwrap_or(f64::NAN),
                y: position.get(1).copied().unwrap_or(f64::NAN),
                z: position.get(2).copied(),
            },
            EsriGeometry::Multipoint(points) => EsriRepr::Multipoint { points },
            EsriGeometry::Polyline(paths) => EsriRepr::Polyline { paths },
            EsriGeometry::Polygon(rings) => EsriRepr::Polygon { rings },
        }
    }
}

/// One record from a feature-service query page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsriFeature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_geometry",
        skip_serializing_if = "Option::is_none"
    )]
    pub geometry: Option<EsriGeometry>,
}

/// Empty geometry objects (`{}`) and null points (`{"x": null}`) are treated
/// as absent rather than as decode failures.
fn deserialize_optional_geometry<'de, D>(deserializer: D) -> Result<Option<EsriGeometry>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(ref obj)) if obj.is_empty() => Ok(None),
        Some(Value::Object(ref obj)) if obj.get("x").is_some_and(Value::is_null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_point_with_spatial_reference() {
        let geometry: EsriGeometry =
            serde_json::from_value(json!({"x": 1.5, "y": 2.5, "spatialReference": {"wkid": 4326}}))
                .unwrap();
        assert_eq!(geometry, EsriGeometry::Point(vec![1.5, 2.5]));
    }

    #[test]
    fn test_decode_point_keeps_z() {
        let geometry: EsriGeometry =
            serde_json::from_value(json!({"x": 1.0, "y": 2.0, "z": 3.0})).unwrap();
        assert_eq!(geometry, EsriGeometry::Point(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_decode_rings() {
        let geometry: EsriGeometry = serde_json::from_value(json!({
            "rings": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        }))
        .unwrap();
        assert!(matches!(geometry, EsriGeometry::Polygon(ref rings) if rings.len() == 1));
    }

    #[test]
    fn test_feature_without_geometry() {
        let feature: EsriFeature =
            serde_json::from_value(json!({"attributes": {"OBJECTID": 1}})).unwrap();
        assert!(feature.geometry.is_none());
        assert_eq!(feature.attributes["OBJECTID"], json!(1));
    }

    #[test]
    fn test_feature_with_empty_geometry() {
        let feature: EsriFeature =
            serde_json::from_value(json!({"attributes": {}, "geometry": {}})).unwrap();
        assert!(feature.geometry.is_none());

        let feature: EsriFeature =
            serde_json::from_value(json!({"attributes": {}, "geometry": {"x": null, "y": null}}))
                .unwrap();
        assert!(feature.geometry.is_none());
    }

    #[test]
    fn test_encode_point() {
        let value = serde_json::to_value(EsriGeometry::Point(vec![3.0, 4.0])).unwrap();
        assert_eq!(value, json!({"x": 3.0, "y": 4.0}));
    }
}
