//! Error types for the PostgreSQL store.

use thiserror::Error;

/// SQLSTATE raised by `TRUNCATE` on a table referenced by a foreign key.
pub const FEATURE_NOT_SUPPORTED: &str = "0A000";

const FOREIGN_KEY_TRUNCATE_MESSAGE: &str =
    "cannot truncate a table referenced in a foreign key constraint";

/// Errors that can occur while talking to PostgreSQL.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Statement failed on the server or the connection dropped.
    #[error("PostgreSQL error: {message}")]
    Database {
        /// SQLSTATE, when the server reported one
        code: Option<String>,
        message: String,
    },

    /// Connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Service file missing, unreadable or incomplete.
    #[error("Service file error: {0}")]
    ServiceFile(String),

    /// A column value could not be converted.
    #[error("Failed to convert column '{column}': {message}")]
    Conversion { column: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Build a server-side error, mostly useful for test doubles.
    pub fn database(code: Option<&str>, message: impl Into<String>) -> Self {
        StoreError::Database {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True for the error `TRUNCATE` raises when another table references
    /// this one through a foreign key.
    pub fn is_foreign_key_truncate(&self) -> bool {
        match self {
            StoreError::Database { code, message } => {
                code.as_deref() == Some(FEATURE_NOT_SUPPORTED)
                    && message.contains(FOREIGN_KEY_TRUNCATE_MESSAGE)
            }
            _ => false,
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        let code = e.code().map(|c| c.code().to_string());
        let message = match e.as_db_error() {
            Some(db) => db.message().to_string(),
            None => e.to_string(),
        };
        StoreError::Database { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_key_truncate_detection() {
        let err = StoreError::database(
            Some("0A000"),
            "cannot truncate a table referenced in a foreign key constraint",
        );
        assert!(err.is_foreign_key_truncate());
        assert_eq!(err.code(), Some("0A000"));
    }

    #[test]
    fn test_other_feature_not_supported_is_not_fk() {
        let err = StoreError::database(Some("0A000"), "cached plan must not change result type");
        assert!(!err.is_foreign_key_truncate());
    }

    #[test]
    fn test_message_without_code_is_not_fk() {
        let err = StoreError::database(
            None,
            "cannot truncate a table referenced in a foreign key constraint",
        );
        assert!(!err.is_foreign_key_truncate());
        assert!(!StoreError::Connection("refused".to_string()).is_foreign_key_truncate());
    }
}
