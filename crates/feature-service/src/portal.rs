//! Portal content types: credentials, items and service definitions.

use crate::metadata::FieldInfo;
use serde::{Deserialize, Serialize};

/// How the client authenticates against the portal.
#[derive(Clone, Default)]
pub enum Credentials {
    /// Requests are sent without a token
    #[default]
    Anonymous,
    /// `generateToken` with a named user
    UserPassword { username: String, password: String },
    /// `oauth2/token` with application credentials
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// A token obtained elsewhere
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Anonymous => f.write_str("Anonymous"),
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Credentials::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// A portal content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub owner: String,
    /// Last modification, epoch milliseconds
    #[serde(default)]
    pub modified: i64,
    #[serde(default, rename = "type")]
    pub item_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<PortalItem>,
    #[serde(default)]
    pub next_start: i64,
}

/// Export formats accepted by the portal's item export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    FileGeodatabase,
    GeoJson,
    Shapefile,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::FileGeodatabase => "File Geodatabase",
            ExportFormat::GeoJson => "GeoJson",
            ExportFormat::Shapefile => "Shapefile",
        }
    }
}

/// Search query for the hosted feature services owned by `owner`.
pub fn feature_services_owned_by(owner: &str) -> String {
    format!("type:\"Feature Service\" AND owner:{owner}")
}

/// Definition used to create a new hosted feature service holding a single
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub description: String,
    pub layer_name: String,
    pub geometry_type: String,
    pub fields: Vec<FieldInfo>,
    pub wkid: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_owner_query() {
        assert_eq!(
            feature_services_owned_by("gis_admin"),
            "type:\"Feature Service\" AND owner:gis_admin"
        );
    }

    #[test]
    fn test_decode_search_results() {
        let response: SearchResponse = serde_json::from_value(json!({
            "total": 2,
            "nextStart": -1,
            "results": [
                {"id": "a1", "title": "Parcels", "owner": "gis", "modified": 1700000000000i64, "type": "Feature Service"},
                {"id": "b2", "title": "Roads", "owner": "gis", "modified": 1690000000000i64, "type": "Feature Service"}
            ]
        }))
        .unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.next_start, -1);
        assert_eq!(response.results[0].item_type, "Feature Service");
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let credentials = Credentials::UserPassword {
            username: "gis".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{credentials:?}");
        assert!(printed.contains("gis"));
        assert!(!printed.contains("hunter2"));
    }
}
