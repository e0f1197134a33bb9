//! SQL for the attachment table, its session staging table and the merge
//! between them.

use crate::table::{qualified_name, quote_ident, TableDescriptor};

/// Parent-table column attachments are matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentKey {
    /// Match `parent_globalid` against this parent column
    GlobalId(String),
    /// Match `parent_oid` against this parent column
    ObjectId(String),
}

impl ParentKey {
    /// Prefer the layer's global-id field when it advertises one. Field names
    /// are lowercased because the loader launders column names.
    pub fn resolve(global_id_field: Option<&str>, object_id_field: Option<&str>) -> Self {
        match global_id_field.filter(|f| !f.is_empty()) {
            Some(field) => ParentKey::GlobalId(field.to_lowercase()),
            None => ParentKey::ObjectId(
                object_id_field
                    .filter(|f| !f.is_empty())
                    .unwrap_or("objectid")
                    .to_lowercase(),
            ),
        }
    }

    fn join_condition(&self) -> String {
        match self {
            ParentKey::GlobalId(column) => format!("p.{} = s.parent_globalid", quote_ident(column)),
            ParentKey::ObjectId(column) => format!("p.{} = s.parent_oid", quote_ident(column)),
        }
    }
}

const PAYLOAD_COLUMNS: &str =
    "attachmentid, parent_oid, parent_globalid, name, size, content_type, exif_info, keywords, url";

/// DDL for `<table>_attach`, referencing the parent's object-id column.
pub fn create_attachment_table_sql(table: &TableDescriptor) -> String {
    format!(
        "CREATE TABLE {} (\
         objectid bigserial PRIMARY KEY, \
         parentid bigint REFERENCES {}({}), \
         attachmentid bigint, \
         parent_oid bigint, \
         parent_globalid varchar(255), \
         name varchar(255), \
         size bigint, \
         content_type varchar(255), \
         exif_info jsonb, \
         keywords varchar(255), \
         url varchar(2083))",
        qualified_name(&table.schema, &table.attachment_table()),
        table.qualified_name(),
        quote_ident(&table.oid_column),
    )
}

/// DDL for the session staging table `_<table>_attach`.
pub fn create_staging_table_sql(table: &TableDescriptor) -> String {
    format!(
        "CREATE TEMP TABLE IF NOT EXISTS {} (\
         attachmentid bigint, \
         parent_oid bigint, \
         parent_globalid varchar(255), \
         name varchar(255), \
         size bigint, \
         content_type varchar(255), \
         exif_info jsonb, \
         keywords varchar(255), \
         url varchar(2083))",
        quote_ident(&table.staging_table())
    )
}

/// Move staged rows into the attachment table, resolving `parentid` through
/// the parent table. Rows without a matching parent keep a NULL `parentid`.
pub fn merge_staging_sql(table: &TableDescriptor, key: &ParentKey) -> String {
    let staged = PAYLOAD_COLUMNS
        .split(", ")
        .map(|c| format!("s.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} (parentid, {PAYLOAD_COLUMNS}) \
         SELECT p.{}, {staged} \
         FROM {} s LEFT JOIN {} p ON {}",
        qualified_name(&table.schema, &table.attachment_table()),
        quote_ident(&table.oid_column),
        quote_ident(&table.staging_table()),
        table.qualified_name(),
        key.join_condition(),
    )
}

pub fn truncate_staging_sql(table: &TableDescriptor) -> String {
    format!("TRUNCATE TABLE {}", quote_ident(&table.staging_table()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcels() -> TableDescriptor {
        TableDescriptor::new("gis", "parcels", "agol_to_pg_oid").with_geometry("geom")
    }

    #[test]
    fn test_parent_key_prefers_global_id() {
        assert_eq!(
            ParentKey::resolve(Some("GlobalID"), Some("OBJECTID")),
            ParentKey::GlobalId("globalid".to_string())
        );
        assert_eq!(
            ParentKey::resolve(Some(""), Some("OBJECTID")),
            ParentKey::ObjectId("objectid".to_string())
        );
        assert_eq!(
            ParentKey::resolve(None, None),
            ParentKey::ObjectId("objectid".to_string())
        );
    }

    #[test]
    fn test_create_attachment_table_references_parent_oid() {
        let sql = create_attachment_table_sql(&parcels());
        assert!(sql.starts_with("CREATE TABLE \"gis\".\"parcels_attach\" ("));
        assert!(sql.contains("objectid bigserial PRIMARY KEY"));
        assert!(sql.contains("parentid bigint REFERENCES \"gis\".\"parcels\"(\"agol_to_pg_oid\")"));
        assert!(sql.contains("exif_info jsonb"));
        assert!(sql.contains("url varchar(2083)"));
    }

    #[test]
    fn test_staging_table_is_temporary() {
        let sql = create_staging_table_sql(&parcels());
        assert!(sql.starts_with("CREATE TEMP TABLE IF NOT EXISTS \"_parcels_attach\""));
        assert!(!sql.contains("parentid"));
    }

    #[test]
    fn test_merge_joins_on_global_id() {
        let sql = merge_staging_sql(&parcels(), &ParentKey::GlobalId("globalid".to_string()));
        assert_eq!(
            sql,
            "INSERT INTO \"gis\".\"parcels_attach\" (parentid, attachmentid, parent_oid, \
             parent_globalid, name, size, content_type, exif_info, keywords, url) \
             SELECT p.\"agol_to_pg_oid\", s.attachmentid, s.parent_oid, s.parent_globalid, \
             s.name, s.size, s.content_type, s.exif_info, s.keywords, s.url \
             FROM \"_parcels_attach\" s LEFT JOIN \"gis\".\"parcels\" p \
             ON p.\"globalid\" = s.parent_globalid"
        );
    }

    #[test]
    fn test_merge_joins_on_object_id() {
        let sql = merge_staging_sql(&parcels(), &ParentKey::ObjectId("objectid".to_string()));
        assert!(sql.ends_with("ON p.\"objectid\" = s.parent_oid"));
    }

    #[test]
    fn test_truncate_staging() {
        assert_eq!(
            truncate_staging_sql(&parcels()),
            "TRUNCATE TABLE \"_parcels_attach\""
        );
    }
}
