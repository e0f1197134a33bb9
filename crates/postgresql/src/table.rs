//! Destination table description and identifier quoting.

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Everything a run needs to know about its destination table. Built once
/// per run and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub schema: String,
    pub table: String,
    /// Object-id column written by the loader
    pub oid_column: String,
    /// `None` for attribute-only tables
    pub geometry_column: Option<String>,
    pub source_srid: Option<i64>,
    pub target_srid: Option<i64>,
}

impl TableDescriptor {
    pub fn new(schema: &str, table: &str, oid_column: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            oid_column: oid_column.to_string(),
            geometry_column: None,
            source_srid: None,
            target_srid: None,
        }
    }

    pub fn with_geometry(mut self, column: &str) -> Self {
        self.geometry_column = Some(column.to_string());
        self
    }

    pub fn with_srids(mut self, source: Option<i64>, target: Option<i64>) -> Self {
        self.source_srid = source;
        self.target_srid = target;
        self
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry_column.is_some()
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(&self.schema, &self.table)
    }

    /// `<table>_attach`
    pub fn attachment_table(&self) -> String {
        format!("{}_attach", self.table)
    }

    /// `_<table>_attach`, the session staging table for attachment pages
    pub fn staging_table(&self) -> String {
        format!("_{}_attach", self.table)
    }

    /// `schema.table` as shown to users.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}
