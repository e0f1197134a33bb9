//! feature-sync library
//!
//! Moves feature data and attachments between hosted feature services and
//! PostgreSQL/PostGIS, and archives feature services to object storage.
//!
//! # Pipelines
//!
//! - [`pipeline::agol_to_pg`]: feature layer -> table, plus attachment records
//!   and their content relocated to a bucket
//! - [`attachments::sync_attachments`]: reconcile an attachment table with a
//!   bucket
//! - [`reverse::transfer_to_service`]: table -> feature layer
//! - [`backup::backup`]: export feature services as file geodatabases into a
//!   bucket, pruning old archives
//! - [`functions::run_function`]: call a stored SQL function
//!
//! Every pipeline reports through a [`progress::Progress`] handle and can be
//! spawned as its own task with [`run::spawn_run`].
//!
//! # CLI Usage
//!
//! ```bash
//! # Feature layer to PostGIS, attachments relocated to S3
//! feature-sync agol2pg --service gis --url https://.../FeatureServer/0 \
//!   --table parcels --save-attachments --bucket s3://gis-attachments
//!
//! # PostGIS table back to a feature layer
//! feature-sync pg2agol --service gis --table parcels --url https://.../FeatureServer/0 --truncate
//!
//! # Archive everything owned by two users, keeping 30 days
//! feature-sync backup --owner gis_admin --owner field_ops --remove-archives --duration 30d
//! ```

use clap::Parser;
use feature_sync_service::{Credentials, DEFAULT_PORTAL_URL};
use std::path::PathBuf;

pub mod attachments;
pub mod backup;
pub mod config;
pub mod connect;
pub mod forward;
pub mod functions;
pub mod loader;
pub mod pipeline;
pub mod progress;
pub mod reverse;
pub mod run;
pub mod srs;
pub mod testing;

#[derive(Parser, Clone)]
pub struct ArcGisOpts {
    /// Portal URL
    #[arg(long, default_value = DEFAULT_PORTAL_URL, env = "ARCGIS_PORTAL_URL")]
    pub portal_url: String,

    /// Portal username
    #[arg(long, env = "ARCGIS_USER")]
    pub arcgis_user: Option<String>,

    /// Portal password
    #[arg(long, env = "ARCGIS_PASSWORD", hide_env_values = true)]
    pub arcgis_password: Option<String>,

    /// OAuth application client id (used when no username is given)
    #[arg(long, env = "ARCGIS_CLIENT_ID")]
    pub arcgis_client_id: Option<String>,

    /// OAuth application client secret
    #[arg(long, env = "ARCGIS_CLIENT_SECRET", hide_env_values = true)]
    pub arcgis_client_secret: Option<String>,
}

impl ArcGisOpts {
    /// Username/password when both are set, else client credentials when
    /// both are set, else anonymous access.
    pub fn credentials(&self) -> Credentials {
        match (
            &self.arcgis_user,
            &self.arcgis_password,
            &self.arcgis_client_id,
            &self.arcgis_client_secret,
        ) {
            (Some(username), Some(password), _, _) => Credentials::UserPassword {
                username: username.clone(),
                password: password.clone(),
            },
            (_, _, Some(client_id), Some(client_secret)) => Credentials::ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            },
            _ => Credentials::Anonymous,
        }
    }
}

#[derive(Parser, Clone)]
pub struct PgOpts {
    /// PostgreSQL service name from the service file
    #[arg(long)]
    pub service: String,

    /// Service file (defaults to ~/.pg_service.conf)
    #[arg(long, env = "PGSERVICEFILE")]
    pub service_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ArcGisOpts {
        ArcGisOpts {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            arcgis_user: None,
            arcgis_password: None,
            arcgis_client_id: None,
            arcgis_client_secret: None,
        }
    }

    #[test]
    fn test_credentials_prefer_user_password() {
        let opts = ArcGisOpts {
            arcgis_user: Some("etl".to_string()),
            arcgis_password: Some("pw".to_string()),
            arcgis_client_id: Some("app".to_string()),
            arcgis_client_secret: Some("secret".to_string()),
            ..opts()
        };
        assert!(matches!(opts.credentials(), Credentials::UserPassword { .. }));
    }

    #[test]
    fn test_credentials_client_fallback() {
        let opts = ArcGisOpts {
            arcgis_user: Some("etl".to_string()),
            arcgis_client_id: Some("app".to_string()),
            arcgis_client_secret: Some("secret".to_string()),
            ..opts()
        };
        assert!(matches!(opts.credentials(), Credentials::ClientCredentials { .. }));
    }

    #[test]
    fn test_credentials_anonymous() {
        assert!(matches!(opts().credentials(), Credentials::Anonymous));
    }
}
