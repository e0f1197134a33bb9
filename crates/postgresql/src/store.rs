//! Store capabilities used by the pipelines and their PostgreSQL
//! implementation.

use crate::error::StoreError;
use crate::schema::ColumnInfo;
use crate::table::{qualified_name, quote_ident};
use crate::value::row_to_attributes;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error};

/// Column name under which reads return the converted geometry.
const GEOMETRY_ALIAS: &str = "__geometry";

/// One attachment tuple flattened from an attachment query page.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub attachment_id: i64,
    pub parent_oid: i64,
    pub parent_globalid: Option<String>,
    pub name: String,
    pub size: Option<i64>,
    pub content_type: Option<String>,
    pub exif_info: Option<Value>,
    pub keywords: Option<String>,
    pub url: Option<String>,
}

/// The columns of an attachment-table row the synchronizer reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRow {
    pub object_id: i64,
    pub attachment_id: i64,
    pub name: String,
    pub url: Option<String>,
}

/// A row read for the reverse direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub attributes: Map<String, Value>,
    /// Parsed GeoJSON geometry, `None` when the row's geometry is NULL
    pub geometry: Option<Value>,
}

/// Table-level operations.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool, StoreError>;

    /// Run one statement and return the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64, StoreError>;
}

/// Attachment staging and reconciliation.
#[async_trait]
pub trait AttachmentStore: TableStore {
    /// Insert flattened records into the (unqualified, session) staging table.
    async fn insert_staging(
        &self,
        staging_table: &str,
        records: &[AttachmentRecord],
    ) -> Result<u64, StoreError>;

    /// Every row of `schema.table`, ordered by object id.
    async fn attachment_rows(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<AttachmentRow>, StoreError>;

    /// Point a row at its relocated content.
    async fn update_attachment(
        &self,
        schema: &str,
        table: &str,
        object_id: i64,
        url: &str,
        name: &str,
    ) -> Result<u64, StoreError>;
}

/// Reads used to publish a table to a feature service.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn primary_key(&self, schema: &str, table: &str) -> Result<Option<String>, StoreError>;

    /// Columns in ordinal order.
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, StoreError>;

    /// `GeometryType()` of the first non-null geometry.
    async fn geometry_type(
        &self,
        schema: &str,
        table: &str,
        geometry_column: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Read `columns` plus, when given, the geometry column reprojected to
    /// `target_srid` and encoded as GeoJSON.
    async fn read_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        geometry_column: Option<&str>,
        target_srid: i64,
    ) -> Result<Vec<SourceRow>, StoreError>;
}

/// Connect and spawn the connection task.
pub async fn connect(config: &Config) -> Result<Client, StoreError> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Connection error: {e}");
        }
    });

    Ok(client)
}

/// PostgreSQL-backed store. The connection runs in autocommit mode, so every
/// statement commits on its own.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        Ok(Self::new(connect(config).await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// `SELECT` statement used by [`RowSource::read_rows`].
pub fn select_rows_sql(
    schema: &str,
    table: &str,
    columns: &[String],
    geometry_column: Option<&str>,
    target_srid: i64,
) -> String {
    let mut select: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    if let Some(geometry) = geometry_column {
        select.push(format!(
            "ST_AsGeoJSON(ST_Transform({}, {target_srid}))::text AS {}",
            quote_ident(geometry),
            quote_ident(GEOMETRY_ALIAS)
        ));
    }
    if select.is_empty() {
        select.push("1".to_string());
    }
    format!(
        "SELECT {} FROM {}",
        select.join(", "),
        qualified_name(schema, table)
    )
}

#[async_trait]
impl TableStore for PgStore {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool, StoreError> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM pg_catalog.pg_class c
                    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                    WHERE n.nspname = $1 AND c.relname = $2
                )",
                &[&schema, &table],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        debug!("Executing: {sql}");
        Ok(self.client.execute(sql, &[]).await?)
    }
}

#[async_trait]
impl AttachmentStore for PgStore {
    async fn insert_staging(
        &self,
        staging_table: &str,
        records: &[AttachmentRecord],
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "INSERT INTO {} (attachmentid, parent_oid, parent_globalid, name, size, \
             content_type, exif_info, keywords, url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            quote_ident(staging_table)
        );
        let statement = self.client.prepare(&sql).await?;

        let mut inserted = 0;
        for record in records {
            inserted += self
                .client
                .execute(
                    &statement,
                    &[
                        &record.attachment_id,
                        &record.parent_oid,
                        &record.parent_globalid,
                        &record.name,
                        &record.size,
                        &record.content_type,
                        &record.exif_info,
                        &record.keywords,
                        &record.url,
                    ],
                )
                .await?;
        }
        Ok(inserted)
    }

    async fn attachment_rows(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<AttachmentRow>, StoreError> {
        let sql = format!(
            "SELECT objectid, attachmentid, name, url FROM {} ORDER BY objectid",
            qualified_name(schema, table)
        );
        let rows = self.client.query(&sql, &[]).await?;

        rows.iter()
            .map(|row| {
                let object_id: i64 = row.try_get(0)?;
                let attachment_id: Option<i64> = row.try_get(1)?;
                let attachment_id = attachment_id.ok_or_else(|| StoreError::Conversion {
                    column: "attachmentid".to_string(),
                    message: format!("NULL attachment id in row {object_id}"),
                })?;
                let name: Option<String> = row.try_get(2)?;
                Ok(AttachmentRow {
                    object_id,
                    attachment_id,
                    name: name.unwrap_or_default(),
                    url: row.try_get(3)?,
                })
            })
            .collect()
    }

    async fn update_attachment(
        &self,
        schema: &str,
        table: &str,
        object_id: i64,
        url: &str,
        name: &str,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET url = $1, name = $2 WHERE objectid = $3",
            qualified_name(schema, table)
        );
        Ok(self.client.execute(&sql, &[&url, &name, &object_id]).await?)
    }
}

#[async_trait]
impl RowSource for PgStore {
    async fn primary_key(&self, schema: &str, table: &str) -> Result<Option<String>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT kcu.column_name::text
                 FROM information_schema.table_constraints AS tc
                 JOIN information_schema.key_column_usage AS kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                   AND tc.table_schema = $1
                   AND tc.table_name = $2
                 ORDER BY kcu.ordinal_position
                 LIMIT 1",
                &[&schema, &table],
            )
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, data_type::text, udt_name::text
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| ColumnInfo {
                name: r.get(0),
                data_type: r.get(1),
                udt_name: r.get(2),
            })
            .collect())
    }

    async fn geometry_type(
        &self,
        schema: &str,
        table: &str,
        geometry_column: &str,
    ) -> Result<Option<String>, StoreError> {
        let geometry = quote_ident(geometry_column);
        let sql = format!(
            "SELECT GeometryType({geometry}) FROM {} WHERE {geometry} IS NOT NULL LIMIT 1",
            qualified_name(schema, table)
        );
        let row = self.client.query_opt(&sql, &[]).await?;
        Ok(row.and_then(|r| r.get::<_, Option<String>>(0)))
    }

    async fn read_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        geometry_column: Option<&str>,
        target_srid: i64,
    ) -> Result<Vec<SourceRow>, StoreError> {
        let sql = select_rows_sql(schema, table, columns, geometry_column, target_srid);
        debug!("Reading rows with: {sql}");
        let rows = self.client.query(&sql, &[]).await?;

        rows.iter()
            .map(|row| {
                let attributes = row_to_attributes(row, columns.len())?;
                let geometry = match geometry_column {
                    Some(_) => {
                        let text: Option<String> = row.try_get(GEOMETRY_ALIAS)?;
                        text.map(|t| serde_json::from_str::<Value>(&t))
                            .transpose()
                            .map_err(|e| StoreError::Conversion {
                                column: GEOMETRY_ALIAS.to_string(),
                                message: e.to_string(),
                            })?
                    }
                    None => None,
                };
                Ok(SourceRow {
                    attributes,
                    geometry,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_rows_with_geometry() {
        let sql = select_rows_sql(
            "public",
            "parcels",
            &["id".to_string(), "name".to_string()],
            Some("geom"),
            3857,
        );
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\", ST_AsGeoJSON(ST_Transform(\"geom\", 3857))::text AS \"__geometry\" FROM \"public\".\"parcels\""
        );
    }

    #[test]
    fn test_select_rows_without_geometry() {
        let sql = select_rows_sql("gis", "owners", &["id".to_string()], None, 3857);
        assert_eq!(sql, "SELECT \"id\" FROM \"gis\".\"owners\"");
    }
}
