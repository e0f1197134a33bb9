//! Destination table preparation before a fresh load.

use crate::attachment::create_attachment_table_sql;
use crate::error::StoreError;
use crate::store::TableStore;
use crate::table::{qualified_name, TableDescriptor};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrepareOptions {
    pub cascade: bool,
    pub restart_identity: bool,
}

impl PrepareOptions {
    /// Options used for feature tables.
    pub fn full_reset() -> Self {
        Self {
            cascade: true,
            restart_identity: true,
        }
    }
}

/// What preparation did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Table absent, nothing done
    Missing,
    /// Table created empty
    Created,
    Truncated,
    /// Truncate was blocked by a foreign key; rows were deleted instead
    Deleted { sequence_reset_skipped: bool },
}

pub fn truncate_sql(schema: &str, table: &str, options: PrepareOptions) -> String {
    let mut sql = format!("TRUNCATE TABLE {}", qualified_name(schema, table));
    if options.restart_identity {
        sql.push_str(" RESTART IDENTITY");
    }
    if options.cascade {
        sql.push_str(" CASCADE");
    }
    sql
}

/// Empty `schema.table` if it exists.
///
/// A truncate refused because of a foreign key falls back to `DELETE`; any
/// other failure is returned.
pub async fn prepare(
    store: &dyn TableStore,
    schema: &str,
    table: &str,
    options: PrepareOptions,
) -> Result<PrepareOutcome, StoreError> {
    if !store.table_exists(schema, table).await? {
        info!("Table {schema}.{table} does not exist, nothing to prepare");
        return Ok(PrepareOutcome::Missing);
    }

    match store.execute(&truncate_sql(schema, table, options)).await {
        Ok(_) => {
            info!("Truncated {schema}.{table}");
            Ok(PrepareOutcome::Truncated)
        }
        Err(e) if e.is_foreign_key_truncate() => {
            warn!("Cannot truncate {schema}.{table} ({e}), deleting rows instead");
            let deleted = store
                .execute(&format!("DELETE FROM {}", qualified_name(schema, table)))
                .await?;
            info!("Deleted {deleted} rows from {schema}.{table}");
            if options.restart_identity {
                warn!("Identity sequences of {schema}.{table} were not reset");
            }
            Ok(PrepareOutcome::Deleted {
                sequence_reset_skipped: options.restart_identity,
            })
        }
        Err(e) => Err(e),
    }
}

/// Create `<table>_attach` when missing, otherwise empty it without touching
/// tables that reference it.
pub async fn prepare_attachment_table(
    store: &dyn TableStore,
    table: &TableDescriptor,
) -> Result<PrepareOutcome, StoreError> {
    let attach = table.attachment_table();
    if !store.table_exists(&table.schema, &attach).await? {
        store.execute(&create_attachment_table_sql(table)).await?;
        info!("Created {}.{attach}", table.schema);
        return Ok(PrepareOutcome::Created);
    }

    prepare(
        store,
        &table.schema,
        &attach,
        PrepareOptions {
            cascade: false,
            restart_identity: true,
        },
    )
    .await
}
