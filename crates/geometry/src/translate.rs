//! Structural conversion between native geometries and GeoJSON.

use crate::error::GeometryError;
use crate::interchange::{collection, feature, parse_geometry};
use crate::{EsriFeature, EsriGeometry};
use geojson::{FeatureCollection, Value as GeoJsonValue};
use serde_json::Value;

/// Convert a native geometry to GeoJSON.
///
/// One path becomes a `LineString`, several become a `MultiLineString`. One
/// ring becomes a `Polygon`; several rings become a `MultiPolygon` with each
/// ring wrapped as its own single-ring polygon, since the native encoding
/// does not say which rings are holes.
pub fn to_interchange(native: &EsriGeometry) -> GeoJsonValue {
    match native {
        EsriGeometry::Point(position) => GeoJsonValue::Point(position.clone()),
        EsriGeometry::Multipoint(points) => GeoJsonValue::MultiPoint(points.clone()),
        EsriGeometry::Polyline(paths) if paths.len() == 1 => {
            GeoJsonValue::LineString(paths[0].clone())
        }
        EsriGeometry::Polyline(paths) => GeoJsonValue::MultiLineString(paths.clone()),
        EsriGeometry::Polygon(rings) if rings.len() == 1 => GeoJsonValue::Polygon(rings.clone()),
        EsriGeometry::Polygon(rings) => {
            GeoJsonValue::MultiPolygon(rings.iter().map(|ring| vec![ring.clone()]).collect())
        }
    }
}

/// Convert a GeoJSON geometry to the native encoding. Geometry collections
/// have no native counterpart.
pub fn to_native(geometry: &GeoJsonValue) -> Result<EsriGeometry, GeometryError> {
    Ok(match geometry {
        GeoJsonValue::Point(position) => EsriGeometry::Point(position.clone()),
        GeoJsonValue::MultiPoint(points) => EsriGeometry::Multipoint(points.clone()),
        GeoJsonValue::LineString(line) => EsriGeometry::Polyline(vec![line.clone()]),
        GeoJsonValue::MultiLineString(lines) => EsriGeometry::Polyline(lines.clone()),
        GeoJsonValue::Polygon(rings) => EsriGeometry::Polygon(rings.clone()),
        GeoJsonValue::MultiPolygon(polygons) => {
            EsriGeometry::Polygon(polygons.iter().flatten().cloned().collect())
        }
        GeoJsonValue::GeometryCollection(_) => {
            return Err(GeometryError::UnsupportedGeometryType(
                "GeometryCollection".to_string(),
            ))
        }
    })
}

/// Convert a raw GeoJSON geometry value (e.g. parsed `ST_AsGeoJSON` output)
/// to the native encoding. `null` maps to `None`.
pub fn geojson_to_native(value: &Value) -> Result<Option<EsriGeometry>, GeometryError> {
    if value.is_null() {
        return Ok(None);
    }
    let geometry = parse_geometry(value)?;
    to_native(&geometry.value).map(Some)
}

/// Convert one query page into a GeoJSON feature collection.
pub fn esri_features_to_collection(features: Vec<EsriFeature>) -> FeatureCollection {
    collection(
        features
            .into_iter()
            .map(|f| feature(f.attributes, f.geometry.as_ref().map(to_interchange)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collection_kind, GeometryKind};
    use serde_json::json;

    fn square(offset: f64) -> Vec<Vec<f64>> {
        vec![
            vec![offset, offset],
            vec![offset + 1.0, offset],
            vec![offset + 1.0, offset + 1.0],
            vec![offset, offset],
        ]
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let samples = vec![
            EsriGeometry::Point(vec![10.0, 20.0]),
            EsriGeometry::Point(vec![10.0, 20.0, 5.0]),
            EsriGeometry::Multipoint(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            EsriGeometry::Polyline(vec![vec![vec![0.0, 0.0], vec![1.0, 1.0]]]),
            EsriGeometry::Polyline(vec![
                vec![vec![0.0, 0.0], vec![1.0, 1.0]],
                vec![vec![2.0, 2.0], vec![3.0, 3.0]],
            ]),
            EsriGeometry::Polygon(vec![square(0.0)]),
            EsriGeometry::Polygon(vec![square(0.0), square(5.0), square(10.0)]),
        ];

        for native in samples {
            assert_eq!(to_native(&to_interchange(&native)).unwrap(), native);
        }
    }

    #[test]
    fn test_single_ring_is_polygon() {
        let geometry = to_interchange(&EsriGeometry::Polygon(vec![square(0.0)]));
        assert_eq!(geometry, GeoJsonValue::Polygon(vec![square(0.0)]));
    }

    #[test]
    fn test_multiple_rings_fold_into_single_ring_polygons() {
        let geometry = to_interchange(&EsriGeometry::Polygon(vec![square(0.0), square(5.0)]));
        assert_eq!(
            geometry,
            GeoJsonValue::MultiPolygon(vec![vec![square(0.0)], vec![square(5.0)]])
        );
    }

    #[test]
    fn test_multipolygon_flattens_every_ring() {
        let geometry = GeoJsonValue::MultiPolygon(vec![
            vec![square(0.0), square(0.25)],
            vec![square(5.0)],
        ]);
        assert_eq!(
            to_native(&geometry).unwrap(),
            EsriGeometry::Polygon(vec![square(0.0), square(0.25), square(5.0)])
        );
    }

    #[test]
    fn test_geojson_value_to_native() {
        let native = geojson_to_native(&json!({
            "type": "LineString",
            "coordinates": [[0.0, 0.0], [2.0, 2.0]]
        }))
        .unwrap();
        assert_eq!(
            native,
            Some(EsriGeometry::Polyline(vec![vec![vec![0.0, 0.0], vec![2.0, 2.0]]]))
        );
        assert_eq!(geojson_to_native(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_page_conversion_keeps_attributes() {
        let features: Vec<EsriFeature> = serde_json::from_value(json!([
            {"attributes": {"OBJECTID": 1, "name": "a"}, "geometry": {"x": 1.0, "y": 2.0}},
            {"attributes": {"OBJECTID": 2, "name": "b"}, "geometry": {"x": 3.0, "y": 4.0}}
        ]))
        .unwrap();

        let collection = esri_features_to_collection(features);
        assert_eq!(collection.features.len(), 2);
        let properties = collection.features[1].properties.as_ref().unwrap();
        assert_eq!(properties["name"], json!("b"));
        assert_eq!(collection_kind(&collection), Some(GeometryKind::Point));
    }

    #[test]
    fn test_empty_page_short_circuits() {
        let collection = esri_features_to_collection(vec![]);
        assert!(collection.features.is_empty());
        assert_eq!(collection_kind(&collection), None);
    }

    #[test]
    fn test_geometry_collection_has_no_native_form() {
        let err = to_native(&GeoJsonValue::GeometryCollection(Vec::new())).unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedGeometryType(_)));
    }
}
