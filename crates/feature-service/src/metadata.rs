//! Layer metadata as returned by `<layerUrl>?f=json`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    #[serde(default)]
    pub wkid: Option<i64>,
    #[serde(default)]
    pub latest_wkid: Option<i64>,
}

impl SpatialReference {
    /// The preferred identifier: `latestWkid` when present, else `wkid`.
    pub fn identifier(&self) -> Option<i64> {
        self.latest_wkid.or(self.wkid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,
}

/// A field definition, used both when reading layer metadata and when
/// defining a new layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Decoded layer metadata. Only the members the pipelines read are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub global_id_field: Option<String>,
    #[serde(default)]
    pub object_id_field: Option<String>,
}

impl LayerMetadata {
    /// A layer without a geometry type is a plain table.
    pub fn has_geometry(&self) -> bool {
        self.geometry_type.as_deref().is_some_and(|g| !g.is_empty())
    }

    /// Spatial reference identifier advertised by the layer extent.
    pub fn spatial_reference(&self) -> Option<i64> {
        self.extent
            .as_ref()
            .and_then(|e| e.spatial_reference.as_ref())
            .and_then(SpatialReference::identifier)
    }

    /// Find a field by name, ignoring case.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// The global id field, when the layer exposes a non-empty one.
    pub fn global_id_field(&self) -> Option<&str> {
        self.global_id_field.as_deref().filter(|f| !f.is_empty())
    }

    pub fn object_id_field(&self) -> Option<&str> {
        self.object_id_field.as_deref().filter(|f| !f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> LayerMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_latest_wkid_preferred() {
        let metadata = decode(json!({
            "geometryType": "esriGeometryPolygon",
            "extent": {"spatialReference": {"wkid": 102100, "latestWkid": 3857}}
        }));
        assert!(metadata.has_geometry());
        assert_eq!(metadata.spatial_reference(), Some(3857));
    }

    #[test]
    fn test_wkid_fallback() {
        let metadata = decode(json!({"extent": {"spatialReference": {"wkid": 4326}}}));
        assert_eq!(metadata.spatial_reference(), Some(4326));
        assert!(!metadata.has_geometry());
    }

    #[test]
    fn test_missing_spatial_reference() {
        let metadata = decode(json!({"extent": {}}));
        assert_eq!(metadata.spatial_reference(), None);
        assert_eq!(decode(json!({})).spatial_reference(), None);
    }

    #[test]
    fn test_field_lookup_ignores_case() {
        let metadata = decode(json!({
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID", "alias": "OBJECTID"},
                {"name": "Name", "type": "esriFieldTypeString"}
            ],
            "globalIdField": "",
            "objectIdField": "OBJECTID"
        }));
        assert!(metadata.field("objectid").is_some());
        assert!(metadata.field("name").is_some());
        assert!(metadata.field("agol_to_pg_oid").is_none());
        assert_eq!(metadata.global_id_field(), None);
        assert_eq!(metadata.object_id_field(), Some("OBJECTID"));
    }
}
