//! Error types for feature-service and portal requests.

use thiserror::Error;

/// Errors returned by the feature-service client.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Non-success HTTP status
    #[error("HTTP {status} from {url}: {body}")]
    Transport {
        status: u16,
        url: String,
        body: String,
    },

    /// The service answered with an `{"error": {...}}` envelope
    #[error("Service error {code} from {url}: {message}")]
    Remote {
        url: String,
        code: i64,
        message: String,
    },

    /// Request could not be sent or the body could not be read
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body did not have the expected shape
    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// No token could be obtained from the portal
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// An item export job reported failure
    #[error("Export job {job_id} failed: {message}")]
    ExportFailed { job_id: String, message: String },

    /// An item export job did not finish in time
    #[error("Timed out waiting for export job {0}")]
    ExportTimeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// True when the service reports that the addressed resource does not
    /// exist, either through the HTTP status or through the error envelope.
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::Transport { status, .. } => *status == 404,
            ServiceError::Remote { code, .. } => *code == 400 || *code == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let missing = ServiceError::Remote {
            url: "https://example.com/0".to_string(),
            code: 400,
            message: "Invalid URL".to_string(),
        };
        assert!(missing.is_not_found());

        let denied = ServiceError::Remote {
            url: "https://example.com/0".to_string(),
            code: 498,
            message: "Invalid token".to_string(),
        };
        assert!(!denied.is_not_found());

        let server = ServiceError::Transport {
            status: 500,
            url: "https://example.com/0".to_string(),
            body: String::new(),
        };
        assert!(!server.is_not_found());
    }
}
