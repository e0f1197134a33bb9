//! Response bodies for feature and attachment queries and for edits.

use feature_sync_geometry::EsriFeature;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of a `<layer>/query` request.
///
/// `features` is optional: a response without it ends pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    #[serde(default)]
    pub features: Option<Vec<EsriFeature>>,
}

impl QueryPage {
    pub fn new(features: Vec<EsriFeature>) -> Self {
        Self {
            features: Some(features),
        }
    }

    /// Take the features out of the page, treating a missing array as empty.
    pub fn into_features(self) -> Vec<EsriFeature> {
        self.features.unwrap_or_default()
    }
}

/// One page of a `<layer>/queryAttachments` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPage {
    #[serde(default)]
    pub attachment_groups: Option<Vec<AttachmentGroup>>,
}

impl AttachmentPage {
    pub fn into_groups(self) -> Vec<AttachmentGroup> {
        self.attachment_groups.unwrap_or_default()
    }
}

/// Attachments belonging to one parent feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentGroup {
    pub parent_object_id: i64,
    #[serde(default)]
    pub parent_global_id: Option<String>,
    #[serde(default)]
    pub attachment_infos: Vec<AttachmentInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub exif_info: Option<Value>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Error detail attached to a single edit result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<EditError>,
}

/// Body of an `applyEdits` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsResponse {
    #[serde(default)]
    pub add_results: Vec<EditResult>,
}

impl ApplyEditsResponse {
    pub fn succeeded(&self) -> usize {
        self.add_results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.add_results.len() - self.succeeded()
    }

    /// First error description reported by the service, if any.
    pub fn first_error(&self) -> Option<String> {
        self.add_results
            .iter()
            .filter_map(|r| r.error.as_ref())
            .map(|e| e.description.clone().unwrap_or_else(|| format!("{:?}", e.code)))
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_without_features_is_empty() {
        let page: QueryPage = serde_json::from_value(json!({"exceededTransferLimit": false})).unwrap();
        assert!(page.features.is_none());
        assert!(page.into_features().is_empty());
    }

    #[test]
    fn test_decode_attachment_groups() {
        let page: AttachmentPage = serde_json::from_value(json!({
            "attachmentGroups": [{
                "parentObjectId": 7,
                "parentGlobalId": "{A1}",
                "attachmentInfos": [{
                    "id": 3,
                    "name": "photo 1.jpg",
                    "size": 2048,
                    "contentType": "image/jpeg",
                    "exifInfo": null,
                    "keywords": "",
                    "url": "https://example.com/attachments/3"
                }]
            }]
        }))
        .unwrap();

        let groups = page.into_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].parent_global_id.as_deref(), Some("{A1}"));
        assert_eq!(groups[0].attachment_infos[0].name, "photo 1.jpg");
        assert_eq!(groups[0].attachment_infos[0].size, Some(2048));
    }

    #[test]
    fn test_apply_edits_counts() {
        let response: ApplyEditsResponse = serde_json::from_value(json!({
            "addResults": [
                {"objectId": 1, "success": true},
                {"success": false, "error": {"code": 1000, "description": "bad geometry"}}
            ]
        }))
        .unwrap();
        assert_eq!(response.succeeded(), 1);
        assert_eq!(response.failed(), 1);
        assert_eq!(response.first_error().as_deref(), Some("bad geometry"));
    }
}
