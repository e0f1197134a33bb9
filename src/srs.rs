//! Spatial reference resolution.

use feature_sync_service::LayerMetadata;

/// Where the source spatial reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSrid {
    Explicit(i64),
    /// Read from the layer extent (`latestWkid`, else `wkid`)
    Discovered(i64),
    /// Spatial layer without a usable spatial reference
    Unresolved,
    /// Layer has no geometry
    NotApplicable,
}

impl SourceSrid {
    pub fn srid(&self) -> Option<i64> {
        match self {
            SourceSrid::Explicit(srid) | SourceSrid::Discovered(srid) => Some(*srid),
            SourceSrid::Unresolved | SourceSrid::NotApplicable => None,
        }
    }
}

/// Resolve the source spatial reference of a layer. An explicit value always
/// wins; metadata is only consulted for layers that advertise a geometry type.
pub fn resolve_source(explicit: Option<i64>, metadata: &LayerMetadata) -> SourceSrid {
    if let Some(srid) = explicit {
        return SourceSrid::Explicit(srid);
    }
    if !metadata.has_geometry() {
        return SourceSrid::NotApplicable;
    }
    match metadata.spatial_reference() {
        Some(srid) => SourceSrid::Discovered(srid),
        None => SourceSrid::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: serde_json::Value) -> LayerMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_explicit_wins() {
        let layer = metadata(json!({
            "geometryType": "esriGeometryPolygon",
            "extent": {"spatialReference": {"wkid": 102100, "latestWkid": 3857}}
        }));
        assert_eq!(resolve_source(Some(2193), &layer), SourceSrid::Explicit(2193));
    }

    #[test]
    fn test_latest_wkid_preferred() {
        let layer = metadata(json!({
            "geometryType": "esriGeometryPolygon",
            "extent": {"spatialReference": {"wkid": 102100, "latestWkid": 3857}}
        }));
        assert_eq!(resolve_source(None, &layer), SourceSrid::Discovered(3857));
    }

    #[test]
    fn test_wkid_fallback() {
        let layer = metadata(json!({
            "geometryType": "esriGeometryPoint",
            "extent": {"spatialReference": {"wkid": 4326}}
        }));
        assert_eq!(resolve_source(None, &layer).srid(), Some(4326));
    }

    #[test]
    fn test_unresolved_spatial_layer() {
        let layer = metadata(json!({"geometryType": "esriGeometryPoint"}));
        assert_eq!(resolve_source(None, &layer), SourceSrid::Unresolved);
    }

    #[test]
    fn test_table_layer_is_not_applicable() {
        let layer = metadata(json!({
            "extent": {"spatialReference": {"wkid": 4326}}
        }));
        assert_eq!(resolve_source(None, &layer), SourceSrid::NotApplicable);
        assert_eq!(resolve_source(None, &layer).srid(), None);
    }
}
