//! Running a stored SQL function.

use crate::progress::Progress;
use anyhow::{Context, Result};
use feature_sync_postgresql::{quote_ident, TableStore};

pub fn search_path_sql(schema: &str) -> String {
    format!("SET search_path TO {}", quote_ident(schema))
}

pub fn call_sql(function: &str) -> String {
    format!("SELECT {}()", quote_ident(function))
}

/// Call the zero-argument function `function` with `schema` as search path.
pub async fn run_function(
    store: &dyn TableStore,
    schema: &str,
    function: &str,
    progress: &Progress,
) -> Result<()> {
    progress
        .info(format!("Running function {function} in schema {schema}"))
        .await;

    let result: Result<u64> = async {
        store
            .execute(&search_path_sql(schema))
            .await
            .with_context(|| format!("Failed to set search_path to {schema}"))?;
        store
            .execute(&call_sql(function))
            .await
            .with_context(|| format!("Function {function} failed"))
    }
    .await;

    match result {
        Ok(_) => {
            progress
                .info(format!("Function {function} completed successfully"))
                .await;
            Ok(())
        }
        Err(e) => {
            progress.error(format!("{e:#}")).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_quotes_identifiers() {
        assert_eq!(search_path_sql("etl"), "SET search_path TO \"etl\"");
        assert_eq!(call_sql("refresh_views"), "SELECT \"refresh_views\"()");
    }
}
