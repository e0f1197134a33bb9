//! In-memory doubles for the feature service, the portal, the store, the
//! loader and the bucket
//!
//! Every pipeline takes its collaborators as trait objects, so the doubles
//! here let a whole run be driven without a network or a database. Each one
//! records what it was asked to do for later assertions.

use crate::loader::SpatialLoader;
use crate::progress::ProgressLine;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use feature_sync_bucket::{BucketObject, ObjectBucket};
use feature_sync_geometry::{EsriFeature, EsriGeometry, FeatureCollection, LoaderGeometryType};
use feature_sync_postgresql::{
    qualified_name, AttachmentRecord, AttachmentRow, AttachmentStore, ColumnInfo, RowSource,
    SourceRow, StoreError, TableDescriptor, TableStore,
};
use feature_sync_service::{
    ApplyEditsResponse, AttachmentGroup, AttachmentPage, EditResult, ExportFormat, FeatureService,
    LayerMetadata, Portal, PortalItem, QueryPage, ServiceDefinition, ServiceError,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Everything currently buffered in a progress receiver.
pub fn drain(lines: &mut mpsc::Receiver<ProgressLine>) -> Vec<ProgressLine> {
    let mut drained = Vec::new();
    while let Ok(line) = lines.try_recv() {
        drained.push(line);
    }
    drained
}

/// A point feature with a single `name` attribute.
pub fn point_feature(id: usize) -> EsriFeature {
    let mut attributes = Map::new();
    attributes.insert("name".to_string(), json!(format!("feature {id}")));
    EsriFeature {
        attributes,
        geometry: Some(EsriGeometry::Point(vec![id as f64, -(id as f64)])),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remote_error(url: &str, code: i64, message: &str) -> ServiceError {
    ServiceError::Remote {
        url: url.to_string(),
        code,
        message: message.to_string(),
    }
}

/// Feature service serving a fixed set of features.
///
/// Queries slice the feature list by offset. Attachment pages are served in
/// call order. Edits and deletes are appended to [`FakeFeatureService::events`].
#[derive(Default)]
pub struct FakeFeatureService {
    pub metadata: LayerMetadata,
    pub features: Vec<EsriFeature>,
    pub attachment_pages: Vec<Vec<AttachmentGroup>>,
    pub downloads: HashMap<String, Bytes>,
    /// Zero-based `add_features` calls that fail
    pub failing_batches: HashSet<usize>,
    pub fail_auth: bool,
    pub fail_delete: bool,
    /// Metadata requests answer "not found"
    pub missing_layer: bool,
    /// `(offset, count)` of every feature query
    pub queries: Mutex<Vec<(usize, usize)>>,
    pub attachment_queries: Mutex<Vec<(usize, usize)>>,
    /// `delete_all` and `add_features:<n>` in call order
    pub events: Mutex<Vec<String>>,
    pub add_calls: AtomicU32,
}

impl FakeFeatureService {
    pub fn new(metadata: LayerMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn with_features(mut self, features: Vec<EsriFeature>) -> Self {
        self.features = features;
        self
    }

    pub fn with_attachment_pages(mut self, pages: Vec<Vec<AttachmentGroup>>) -> Self {
        self.attachment_pages = pages;
        self
    }

    pub fn with_download(mut self, url: &str, content: &'static [u8]) -> Self {
        self.downloads.insert(url.to_string(), Bytes::from_static(content));
        self
    }

    pub fn with_failing_batches(mut self, batches: &[usize]) -> Self {
        self.failing_batches = batches.iter().copied().collect();
        self
    }

    pub fn queries(&self) -> Vec<(usize, usize)> {
        lock(&self.queries).clone()
    }

    pub fn attachment_queries(&self) -> Vec<(usize, usize)> {
        lock(&self.attachment_queries).clone()
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl FeatureService for FakeFeatureService {
    async fn authenticate(&self) -> Result<(), ServiceError> {
        if self.fail_auth {
            return Err(ServiceError::Auth("invalid username or password".to_string()));
        }
        Ok(())
    }

    async fn metadata(&self, layer_url: &str) -> Result<LayerMetadata, ServiceError> {
        if self.missing_layer {
            return Err(remote_error(layer_url, 400, "Invalid URL"));
        }
        Ok(self.metadata.clone())
    }

    async fn query(
        &self,
        _layer_url: &str,
        offset: usize,
        count: usize,
    ) -> Result<QueryPage, ServiceError> {
        lock(&self.queries).push((offset, count));
        let start = offset.min(self.features.len());
        let end = (offset + count).min(self.features.len());
        Ok(QueryPage::new(self.features[start..end].to_vec()))
    }

    async fn query_attachments(
        &self,
        _layer_url: &str,
        offset: usize,
        count: usize,
    ) -> Result<AttachmentPage, ServiceError> {
        let call = {
            let mut calls = lock(&self.attachment_queries);
            calls.push((offset, count));
            calls.len() - 1
        };
        Ok(AttachmentPage {
            attachment_groups: self.attachment_pages.get(call).cloned(),
        })
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, ServiceError> {
        let content = self.downloads.get(url).ok_or(ServiceError::Transport {
            status: 404,
            url: url.to_string(),
            body: "Not Found".to_string(),
        })?;
        tokio::fs::write(dest, content).await?;
        Ok(content.len() as u64)
    }

    async fn add_features(
        &self,
        layer_url: &str,
        features: &[EsriFeature],
    ) -> Result<ApplyEditsResponse, ServiceError> {
        let call = self.add_calls.fetch_add(1, Ordering::SeqCst) as usize;
        lock(&self.events).push(format!("add_features:{}", features.len()));
        if self.failing_batches.contains(&call) {
            return Err(remote_error(layer_url, 500, "Unable to complete operation."));
        }
        Ok(ApplyEditsResponse {
            add_results: features
                .iter()
                .enumerate()
                .map(|(i, _)| EditResult {
                    object_id: Some(i as i64 + 1),
                    success: true,
                    error: None,
                })
                .collect(),
        })
    }

    async fn delete_all(&self, layer_url: &str) -> Result<(), ServiceError> {
        lock(&self.events).push("delete_all".to_string());
        if self.fail_delete {
            return Err(remote_error(layer_url, 500, "Unable to delete features."));
        }
        Ok(())
    }
}

/// Portal with a fixed catalog.
///
/// Exports produce `<title>.zip` files in the download directory.
#[derive(Default)]
pub struct FakePortal {
    pub items: Vec<PortalItem>,
    /// Item ids whose export fails
    pub failing_exports: HashSet<String>,
    /// Deleting an item fails
    pub fail_delete: bool,
    pub searches: Mutex<Vec<String>>,
    /// Titles requested for exports
    pub exports: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub created: Mutex<Vec<ServiceDefinition>>,
}

impl FakePortal {
    pub fn new(items: Vec<PortalItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn exports(&self) -> Vec<String> {
        lock(&self.exports).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn created(&self) -> Vec<ServiceDefinition> {
        lock(&self.created).clone()
    }
}

/// A feature-service item owned by `owner`.
pub fn portal_item(id: &str, title: &str, owner: &str, modified: i64) -> PortalItem {
    PortalItem {
        id: id.to_string(),
        title: title.to_string(),
        owner: owner.to_string(),
        modified,
        item_type: "Feature Service".to_string(),
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn search(
        &self,
        query: &str,
        max_items: usize,
    ) -> Result<Vec<PortalItem>, ServiceError> {
        lock(&self.searches).push(query.to_string());
        Ok(self
            .items
            .iter()
            .filter(|item| query.ends_with(&format!("owner:{}", item.owner)))
            .take(max_items)
            .cloned()
            .collect())
    }

    async fn export_item(
        &self,
        item: &PortalItem,
        title: &str,
        _format: ExportFormat,
    ) -> Result<PortalItem, ServiceError> {
        if self.failing_exports.contains(&item.id) {
            return Err(ServiceError::ExportFailed {
                job_id: format!("job-{}", item.id),
                message: "Export operation failed".to_string(),
            });
        }
        lock(&self.exports).push(title.to_string());
        Ok(PortalItem {
            id: format!("export-{}", item.id),
            title: title.to_string(),
            owner: item.owner.clone(),
            modified: item.modified,
            item_type: "File Geodatabase".to_string(),
        })
    }

    async fn download_item(
        &self,
        item: &PortalItem,
        dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let path = dir.join(format!("{}.zip", item.title));
        tokio::fs::write(&path, b"PK\x03\x04").await?;
        Ok(path)
    }

    async fn delete_item(&self, item: &PortalItem) -> Result<(), ServiceError> {
        if self.fail_delete {
            return Err(ServiceError::Remote {
                url: format!("https://www.example.com/sharing/rest/content/items/{}/delete", item.id),
                code: 500,
                message: "Unable to delete item".to_string(),
            });
        }
        lock(&self.deleted).push(item.id.clone());
        Ok(())
    }

    async fn create_service(
        &self,
        definition: &ServiceDefinition,
    ) -> Result<String, ServiceError> {
        lock(&self.created).push(definition.clone());
        Ok(format!(
            "https://services.example.com/arcgis/rest/services/{}/FeatureServer/0",
            definition.name
        ))
    }
}

/// Store that records every statement instead of running it.
#[derive(Default)]
pub struct FakeStore {
    /// `"schema"."table"` of the tables that exist
    pub tables: Mutex<HashSet<String>>,
    /// Tables whose truncate is refused because of a foreign key
    pub referenced: HashSet<String>,
    /// Statements starting with one of these prefixes fail
    pub failing_statements: Vec<String>,
    pub executed: Mutex<Vec<String>>,
    pub staged: Mutex<Vec<AttachmentRecord>>,
    pub attachment_rows: Mutex<Vec<AttachmentRow>>,
    pub primary_key: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub geometry_type: Option<String>,
    pub rows: Vec<SourceRow>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, schema: &str, table: &str) -> Self {
        lock(&self.tables).insert(qualified_name(schema, table));
        self
    }

    /// Make `TRUNCATE` of `schema.table` fail as if another table
    /// referenced it.
    pub fn with_referenced_table(mut self, schema: &str, table: &str) -> Self {
        self.referenced.insert(qualified_name(schema, table));
        self.with_table(schema, table)
    }

    pub fn with_failing_statement(mut self, prefix: &str) -> Self {
        self.failing_statements.push(prefix.to_string());
        self
    }

    pub fn with_attachment_rows(self, rows: Vec<AttachmentRow>) -> Self {
        *lock(&self.attachment_rows) = rows;
        self
    }

    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    pub fn staged(&self) -> Vec<AttachmentRecord> {
        lock(&self.staged).clone()
    }

    /// Attachment rows as currently stored.
    pub fn rows_now(&self) -> Vec<AttachmentRow> {
        lock(&self.attachment_rows).clone()
    }
}

#[async_trait]
impl TableStore for FakeStore {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.tables).contains(&qualified_name(schema, table)))
    }

    async fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        lock(&self.executed).push(sql.to_string());
        if let Some(prefix) = self.failing_statements.iter().find(|p| sql.starts_with(p.as_str())) {
            return Err(StoreError::database(
                Some("42501"),
                format!("permission denied for statement {prefix}"),
            ));
        }
        if sql.starts_with("TRUNCATE TABLE")
            && self.referenced.iter().any(|t| sql.contains(t.as_str()))
        {
            return Err(StoreError::database(
                Some("0A000"),
                "cannot truncate a table referenced in a foreign key constraint",
            ));
        }
        Ok(0)
    }
}

#[async_trait]
impl AttachmentStore for FakeStore {
    async fn insert_staging(
        &self,
        _staging_table: &str,
        records: &[AttachmentRecord],
    ) -> Result<u64, StoreError> {
        lock(&self.staged).extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn attachment_rows(
        &self,
        _schema: &str,
        _table: &str,
    ) -> Result<Vec<AttachmentRow>, StoreError> {
        let mut rows = lock(&self.attachment_rows).clone();
        rows.sort_by_key(|r| r.object_id);
        Ok(rows)
    }

    async fn update_attachment(
        &self,
        _schema: &str,
        _table: &str,
        object_id: i64,
        url: &str,
        name: &str,
    ) -> Result<u64, StoreError> {
        let mut rows = lock(&self.attachment_rows);
        let mut updated = 0;
        for row in rows.iter_mut().filter(|r| r.object_id == object_id) {
            row.url = Some(url.to_string());
            row.name = name.to_string();
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl RowSource for FakeStore {
    async fn primary_key(&self, _schema: &str, _table: &str) -> Result<Option<String>, StoreError> {
        Ok(self.primary_key.clone())
    }

    async fn columns(&self, _schema: &str, _table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        Ok(self.columns.clone())
    }

    async fn geometry_type(
        &self,
        _schema: &str,
        _table: &str,
        _geometry_column: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.geometry_type.clone())
    }

    async fn read_rows(
        &self,
        _schema: &str,
        _table: &str,
        _columns: &[String],
        _geometry_column: Option<&str>,
        _target_srid: i64,
    ) -> Result<Vec<SourceRow>, StoreError> {
        Ok(self.rows.clone())
    }
}

/// One source row with an `id` primary key, a `name` and a point.
pub fn source_row(id: i64) -> SourceRow {
    let mut attributes = Map::new();
    attributes.insert("id".to_string(), json!(id));
    attributes.insert("name".to_string(), json!(format!("row {id}")));
    SourceRow {
        attributes,
        geometry: Some(json!({"type": "Point", "coordinates": [id as f64, 1.0]})),
    }
}

/// Loader that keeps what it was given.
#[derive(Default)]
pub struct RecordingLoader {
    /// `(feature count, geometry type)` per load
    pub loads: Mutex<Vec<(usize, LoaderGeometryType)>>,
    /// Zero-based load that fails
    pub fail_on: Option<usize>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> Vec<(usize, LoaderGeometryType)> {
        lock(&self.loads).clone()
    }
}

#[async_trait]
impl SpatialLoader for RecordingLoader {
    async fn load(
        &self,
        features: &FeatureCollection,
        table: &TableDescriptor,
        geometry_type: LoaderGeometryType,
    ) -> Result<()> {
        let mut loads = lock(&self.loads);
        if self.fail_on == Some(loads.len()) {
            anyhow::bail!("ogr2ogr failed loading into {}", table.display_name());
        }
        loads.push((features.features.len(), geometry_type));
        Ok(())
    }
}

/// Bucket held in memory.
#[derive(Default)]
pub struct MemoryBucket {
    pub objects: Mutex<BTreeMap<String, Bytes>>,
    /// Remaining `upload_file` calls that fail
    pub failing_uploads: AtomicU32,
    pub upload_attempts: AtomicU32,
    pub deleted: Mutex<Vec<String>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, name: &str, content: &'static [u8]) -> Self {
        lock(&self.objects).insert(name.to_string(), Bytes::from_static(content));
        self
    }

    pub fn with_failing_uploads(self, count: u32) -> Self {
        self.failing_uploads.store(count, Ordering::SeqCst);
        self
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        lock(&self.objects).get(name).cloned()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn upload_attempts(&self) -> u32 {
        self.upload_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectBucket for MemoryBucket {
    fn display_name(&self) -> String {
        "memory".to_string()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BucketObject>> {
        Ok(lock(&self.objects)
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, content)| BucketObject {
                name: name.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn upload_file(&self, name: &str, path: &Path) -> Result<()> {
        self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("connection reset uploading {name}");
        }
        let content = tokio::fs::read(path).await?;
        lock(&self.objects).insert(name.to_string(), Bytes::from(content));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        lock(&self.objects).remove(name);
        lock(&self.deleted).push(name.to_string());
        Ok(())
    }

    fn object_url(&self, name: &str) -> String {
        format!("memory://{name}")
    }
}

/// Layer metadata for a point layer in `wkid` with a global id field.
pub fn point_layer(wkid: i64) -> LayerMetadata {
    let value: Value = json!({
        "name": "Parcels",
        "geometryType": "esriGeometryPoint",
        "extent": {"spatialReference": {"wkid": wkid}},
        "fields": [
            {"name": "OBJECTID", "type": "esriFieldTypeOID"},
            {"name": "GlobalID", "type": "esriFieldTypeGlobalID"},
            {"name": "name", "type": "esriFieldTypeString"}
        ],
        "globalIdField": "GlobalID",
        "objectIdField": "OBJECTID"
    });
    serde_json::from_value(value).unwrap_or_default()
}
