//! REST implementation of [`FeatureService`] and [`Portal`].

use crate::error::ServiceError;
use crate::metadata::LayerMetadata;
use crate::portal::{Credentials, ExportFormat, PortalItem, SearchResponse, ServiceDefinition};
use crate::query::{ApplyEditsResponse, AttachmentPage, QueryPage};
use crate::traits::{FeatureService, Portal};
use async_trait::async_trait;
use feature_sync_geometry::EsriFeature;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Default portal when none is configured.
pub const DEFAULT_PORTAL_URL: &str = "https://www.arcgis.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(3600);
const SEARCH_PAGE_SIZE: usize = 100;
const MAX_ERROR_BODY: usize = 512;

type Params = Vec<(&'static str, String)>;

/// Feature-service and portal client over the ArcGIS REST API.
///
/// The token is acquired lazily on the first request (or explicitly through
/// [`FeatureService::authenticate`]) and reused afterwards.
pub struct ArcGisClient {
    http: reqwest::Client,
    portal_url: String,
    credentials: Credentials,
    token: OnceCell<Option<String>>,
    username: OnceCell<String>,
    export_poll_interval: Duration,
    export_timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateTokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct SelfResponse {
    username: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportResponse {
    export_item_id: String,
    job_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    status_message: Option<String>,
}

#[derive(Deserialize)]
struct CreateServiceResponse {
    #[serde(default, rename = "encodedServiceURL")]
    encoded_service_url: Option<String>,
    #[serde(default)]
    serviceurl: Option<String>,
}

impl ArcGisClient {
    pub fn new(portal_url: &str, credentials: Credentials) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|source| ServiceError::Http {
                url: portal_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            portal_url: portal_url.trim_end_matches('/').to_string(),
            credentials,
            token: OnceCell::new(),
            username: OnceCell::new(),
            export_poll_interval: Duration::from_secs(2),
            export_timeout: READ_TIMEOUT,
        })
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/sharing/rest/{path}", self.portal_url)
    }

    async fn token(&self) -> Result<Option<String>, ServiceError> {
        self.token
            .get_or_try_init(|| self.acquire_token())
            .await
            .cloned()
    }

    async fn acquire_token(&self) -> Result<Option<String>, ServiceError> {
        match &self.credentials {
            Credentials::Anonymous => Ok(None),
            Credentials::Token(token) => Ok(Some(token.clone())),
            Credentials::UserPassword { username, password } => {
                let url = self.rest_url("generateToken");
                debug!("Requesting token for {username} from {url}");
                let params: Params = vec![
                    ("username", username.clone()),
                    ("password", password.clone()),
                    ("client", "referer".to_string()),
                    ("referer", self.portal_url.clone()),
                    ("expiration", "60".to_string()),
                    ("f", "json".to_string()),
                ];
                let response: GenerateTokenResponse = self
                    .execute(&url, self.http.post(&url).form(&params))
                    .await
                    .map_err(|e| ServiceError::Auth(e.to_string()))?;
                response
                    .token
                    .map(Some)
                    .ok_or_else(|| ServiceError::Auth(format!("No token in response from {url}")))
            }
            Credentials::ClientCredentials {
                client_id,
                client_secret,
            } => {
                let url = self.rest_url("oauth2/token/");
                debug!("Requesting application token for {client_id} from {url}");
                let params: Params = vec![
                    ("client_id", client_id.clone()),
                    ("client_secret", client_secret.clone()),
                    ("grant_type", "client_credentials".to_string()),
                    ("f", "json".to_string()),
                ];
                let response: OAuthTokenResponse = self
                    .execute(&url, self.http.post(&url).form(&params))
                    .await
                    .map_err(|e| ServiceError::Auth(e.to_string()))?;
                response.access_token.map(Some).ok_or_else(|| {
                    ServiceError::Auth(format!("No access_token in response from {url}"))
                })
            }
        }
    }

    /// Name of the authenticated user, which owns exports and new services.
    async fn username(&self) -> Result<String, ServiceError> {
        self.username
            .get_or_try_init(|| self.fetch_username())
            .await
            .cloned()
    }

    async fn fetch_username(&self) -> Result<String, ServiceError> {
        if let Credentials::UserPassword { username, .. } = &self.credentials {
            return Ok(username.clone());
        }
        let url = self.rest_url("community/self");
        let response: SelfResponse = self.get_json(&url, vec![]).await?;
        response
            .username
            .ok_or_else(|| ServiceError::Auth(format!("No username returned by {url}")))
    }

    async fn with_token(&self, mut params: Params) -> Result<Params, ServiceError> {
        params.push(("f", "json".to_string()));
        if let Some(token) = self.token().await? {
            params.push(("token", token));
        }
        Ok(params)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Params,
    ) -> Result<T, ServiceError> {
        let params = self.with_token(params).await?;
        self.execute(url, self.http.get(url).query(&params)).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Params,
    ) -> Result<T, ServiceError> {
        let params = self.with_token(params).await?;
        self.execute(url, self.http.post(url).form(&params)).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|source| ServiceError::Http {
            url: url.to_string(),
            source,
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| ServiceError::Http {
            url: url.to_string(),
            source,
        })?;
        decode_body(url, status, &body)
    }

    /// Write the body of `url` to `path` chunk by chunk.
    async fn stream_to_file(&self, url: &str, path: &Path) -> Result<u64, ServiceError> {
        let mut response = self.fetch(url).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|source| ServiceError::Http {
            url: url.to_string(),
            source,
        })? {
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, ServiceError> {
        let mut params: Params = vec![];
        if let Some(token) = self.token().await? {
            params.push(("token", token));
        }
        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|source| ServiceError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Transport {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate(&body),
            });
        }
        Ok(response)
    }

    async fn wait_for_export(
        &self,
        owner: &str,
        export: &ExportResponse,
    ) -> Result<(), ServiceError> {
        let url = self.rest_url(&format!(
            "content/users/{owner}/items/{}/status",
            export.export_item_id
        ));

        let poll = async {
            loop {
                let status: JobStatus = self
                    .get_json(
                        &url,
                        vec![
                            ("jobId", export.job_id.clone()),
                            ("jobType", "export".to_string()),
                        ],
                    )
                    .await?;

                match status.status.as_str() {
                    "completed" => return Ok(()),
                    "failed" => {
                        return Err(ServiceError::ExportFailed {
                            job_id: export.job_id.clone(),
                            message: status.status_message.unwrap_or_default(),
                        })
                    }
                    other => {
                        debug!("Export job {} is {other}", export.job_id);
                        tokio::time::sleep(self.export_poll_interval).await;
                    }
                }
            }
        };

        tokio::time::timeout(self.export_timeout, poll)
            .await
            .map_err(|_| ServiceError::ExportTimeout(export.job_id.clone()))?
    }
}

/// Decode a response body, turning non-success statuses and the service's
/// `{"error": {...}}` envelope into errors.
pub(crate) fn decode_body<T: DeserializeOwned>(
    url: &str,
    status: u16,
    body: &str,
) -> Result<T, ServiceError> {
    if !(200..300).contains(&status) {
        return Err(ServiceError::Transport {
            status,
            url: url.to_string(),
            body: truncate(body),
        });
    }

    let value: Value = serde_json::from_str(body).map_err(|source| ServiceError::Decode {
        url: url.to_string(),
        source,
    })?;

    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let mut message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        if let Some(details) = error.get("details").and_then(Value::as_array) {
            let details: Vec<&str> = details.iter().filter_map(Value::as_str).collect();
            if !details.is_empty() {
                message = format!("{message} ({})", details.join("; "));
            }
        }
        return Err(ServiceError::Remote {
            url: url.to_string(),
            code,
            message,
        });
    }

    serde_json::from_value(value).map_err(|source| ServiceError::Decode {
        url: url.to_string(),
        source,
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Administrative endpoint for a hosted service URL.
pub fn admin_url(service_url: &str) -> String {
    service_url.replacen("/rest/services/", "/rest/admin/services/", 1)
}

fn layer_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

#[async_trait]
impl FeatureService for ArcGisClient {
    async fn authenticate(&self) -> Result<(), ServiceError> {
        self.token().await.map(|_| ())
    }

    async fn metadata(&self, url: &str) -> Result<LayerMetadata, ServiceError> {
        self.get_json(layer_url(url), vec![]).await
    }

    async fn query(
        &self,
        url: &str,
        offset: usize,
        count: usize,
    ) -> Result<QueryPage, ServiceError> {
        let url = format!("{}/query", layer_url(url));
        self.get_json(
            &url,
            vec![
                ("where", "1=1".to_string()),
                ("outFields", "*".to_string()),
                ("resultOffset", offset.to_string()),
                ("resultRecordCount", count.to_string()),
            ],
        )
        .await
    }

    async fn query_attachments(
        &self,
        url: &str,
        offset: usize,
        count: usize,
    ) -> Result<AttachmentPage, ServiceError> {
        let url = format!("{}/queryAttachments", layer_url(url));
        self.get_json(
            &url,
            vec![
                ("definitionExpression", "1=1".to_string()),
                ("returnUrl", "true".to_string()),
                ("resultOffset", offset.to_string()),
                ("resultRecordCount", count.to_string()),
            ],
        )
        .await
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, ServiceError> {
        let written = self.stream_to_file(url, dest).await?;
        debug!("Fetched {} bytes from: {}", written, url);
        Ok(written)
    }

    async fn add_features(
        &self,
        url: &str,
        features: &[EsriFeature],
    ) -> Result<ApplyEditsResponse, ServiceError> {
        let url = format!("{}/applyEdits", layer_url(url));
        let adds = serde_json::to_string(features).map_err(|source| ServiceError::Decode {
            url: url.clone(),
            source,
        })?;
        self.post_form(&url, vec![("adds", adds)]).await
    }

    async fn delete_all(&self, url: &str) -> Result<(), ServiceError> {
        let url = format!("{}/deleteFeatures", layer_url(url));
        let _: Value = self
            .post_form(&url, vec![("where", "1=1".to_string())])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Portal for ArcGisClient {
    async fn search(
        &self,
        query: &str,
        max_items: usize,
    ) -> Result<Vec<PortalItem>, ServiceError> {
        let url = self.rest_url("search");
        let mut items = Vec::new();
        let mut start: i64 = 1;

        while items.len() < max_items {
            let num = SEARCH_PAGE_SIZE.min(max_items - items.len());
            let page: SearchResponse = self
                .get_json(
                    &url,
                    vec![
                        ("q", query.to_string()),
                        ("sortField", "modified".to_string()),
                        ("sortOrder", "desc".to_string()),
                        ("num", num.to_string()),
                        ("start", start.to_string()),
                    ],
                )
                .await?;

            let fetched = page.results.len();
            items.extend(page.results);
            if fetched == 0 || page.next_start <= 0 {
                break;
            }
            start = page.next_start;
        }

        items.truncate(max_items);
        Ok(items)
    }

    async fn export_item(
        &self,
        item: &PortalItem,
        title: &str,
        format: ExportFormat,
    ) -> Result<PortalItem, ServiceError> {
        let owner = self.username().await?;
        let url = self.rest_url(&format!("content/users/{owner}/export"));
        let export: ExportResponse = self
            .post_form(
                &url,
                vec![
                    ("itemId", item.id.clone()),
                    ("title", title.to_string()),
                    ("exportFormat", format.as_str().to_string()),
                ],
            )
            .await?;

        info!(
            "Export of {} started as job {} (item {})",
            item.title, export.job_id, export.export_item_id
        );
        self.wait_for_export(&owner, &export).await?;

        Ok(PortalItem {
            id: export.export_item_id,
            title: title.to_string(),
            owner,
            modified: 0,
            item_type: format.as_str().to_string(),
        })
    }

    async fn download_item(
        &self,
        item: &PortalItem,
        dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let url = self.rest_url(&format!("content/items/{}/data", item.id));
        let path = dir.join(format!("{}.zip", item.title));
        let written = self.stream_to_file(&url, &path).await?;

        debug!("Downloaded {} bytes to {}", written, path.display());
        Ok(path)
    }

    async fn delete_item(&self, item: &PortalItem) -> Result<(), ServiceError> {
        let owner = if item.owner.is_empty() {
            self.username().await?
        } else {
            item.owner.clone()
        };
        let url = self.rest_url(&format!("content/users/{owner}/items/{}/delete", item.id));
        let _: Value = self.post_form(&url, vec![]).await?;
        Ok(())
    }

    async fn create_service(&self, definition: &ServiceDefinition) -> Result<String, ServiceError> {
        let owner = self.username().await?;
        let url = self.rest_url(&format!("content/users/{owner}/createService"));

        let mut parameters = json!({
            "name": definition.name,
            "serviceDescription": definition.description,
            "capabilities": "Create,Query,Update,Delete",
            "hasStaticData": false,
        });
        if let Some(wkid) = definition.wkid {
            parameters["spatialReference"] = json!({ "wkid": wkid });
        }

        let created: CreateServiceResponse = self
            .post_form(
                &url,
                vec![
                    ("outputType", "featureService".to_string()),
                    ("createParameters", parameters.to_string()),
                ],
            )
            .await?;

        let service_url = created
            .encoded_service_url
            .or(created.serviceurl)
            .ok_or_else(|| ServiceError::Remote {
                url: url.clone(),
                code: 0,
                message: "createService returned no service URL".to_string(),
            })?;

        let layer = json!({
            "layers": [{
                "name": definition.layer_name,
                "type": "Feature Layer",
                "geometryType": definition.geometry_type,
                "fields": definition.fields,
            }]
        });
        let admin = format!("{}/addToDefinition", admin_url(&service_url));
        let _: Value = self
            .post_form(&admin, vec![("addToDefinition", layer.to_string())])
            .await?;

        info!("Created feature service {} at {}", definition.name, service_url);
        Ok(format!("{}/0", service_url.trim_end_matches('/')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_envelope_with_ok_status() {
        let body = r#"{"error":{"code":498,"message":"Invalid token.","details":["Token expired"]}}"#;
        let err = decode_body::<Value>("https://example.com/0/query", 200, body).unwrap_err();
        match err {
            ServiceError::Remote { code, message, .. } => {
                assert_eq!(code, 498);
                assert_eq!(message, "Invalid token. (Token expired)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_non_success_status() {
        let err = decode_body::<Value>("https://example.com/0", 503, "unavailable").unwrap_err();
        assert!(matches!(err, ServiceError::Transport { status: 503, ref body, .. } if body == "unavailable"));
    }

    #[test]
    fn test_decode_body_into_page() {
        let body = r#"{"features":[{"attributes":{"OBJECTID":1},"geometry":{"x":1,"y":2}}]}"#;
        let page: QueryPage = decode_body("https://example.com/0/query", 200, body).unwrap();
        assert_eq!(page.into_features().len(), 1);
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode_body::<Value>("https://example.com/0", 200, "<html>").unwrap_err();
        assert!(matches!(err, ServiceError::Decode { .. }));
    }

    #[test]
    fn test_admin_url() {
        assert_eq!(
            admin_url("https://services.arcgis.com/abc/arcgis/rest/services/Parcels/FeatureServer"),
            "https://services.arcgis.com/abc/arcgis/rest/admin/services/Parcels/FeatureServer"
        );
    }

    #[test]
    fn test_client_trims_portal_url() {
        let client = ArcGisClient::new("https://www.arcgis.com/", Credentials::Anonymous).unwrap();
        assert_eq!(client.portal_url(), "https://www.arcgis.com");
        assert_eq!(
            client.rest_url("search"),
            "https://www.arcgis.com/sharing/rest/search"
        );
    }

    #[tokio::test]
    async fn test_static_token_is_used_without_requests() {
        let client = ArcGisClient::new(DEFAULT_PORTAL_URL, Credentials::Token("abc".to_string()))
            .unwrap();
        client.authenticate().await.unwrap();
        assert_eq!(client.token().await.unwrap().as_deref(), Some("abc"));
    }
}
