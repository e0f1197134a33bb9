use crate::{ArcGisOpts, PgOpts};
use anyhow::Context;
use feature_sync_postgresql::{PgServiceFile, PgStore};
use feature_sync_service::ArcGisClient;
use std::path::Path;

/// Load `path`, else the default service file.
pub fn load_service_file(path: Option<&Path>) -> anyhow::Result<PgServiceFile> {
    let file = match path {
        Some(path) => PgServiceFile::load(path)?,
        None => PgServiceFile::load_default()?,
    };
    Ok(file)
}

// Connect to PostgreSQL through a named service
pub async fn connect_to_postgresql(pg_opts: &PgOpts) -> anyhow::Result<PgStore> {
    let services = load_service_file(pg_opts.service_file.as_deref())?;
    let config = services.service(&pg_opts.service)?;
    let store = PgStore::connect(&config)
        .await
        .with_context(|| format!("Failed to connect using service {}", pg_opts.service))?;
    Ok(store)
}

pub fn connect_to_portal(opts: &ArcGisOpts) -> anyhow::Result<ArcGisClient> {
    ArcGisClient::new(&opts.portal_url, opts.credentials())
        .with_context(|| format!("Failed to create client for {}", opts.portal_url))
}
