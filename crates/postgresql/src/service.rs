//! Connection service file (`pg_service.conf`) resolution.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_postgres::Config;

/// Environment variable naming the service file.
pub const SERVICE_FILE_ENV: &str = "PGSERVICEFILE";

const USER_SERVICE_FILE: &str = ".pg_service.conf";

fn resolve_path(env: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    match env {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => home.map(|home| home.join(USER_SERVICE_FILE)),
    }
}

/// A parsed service file: named sections of `key=value` connection
/// parameters.
#[derive(Debug, Clone, Default)]
pub struct PgServiceFile {
    path: Option<PathBuf>,
    services: Vec<(String, BTreeMap<String, String>)>,
}

impl PgServiceFile {
    /// `PGSERVICEFILE` when set, else `~/.pg_service.conf`.
    pub fn default_path() -> Option<PathBuf> {
        resolve_path(std::env::var_os(SERVICE_FILE_ENV), dirs::home_dir())
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::ServiceFile(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut file = Self::parse(&text);
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Load the file at [`PgServiceFile::default_path`].
    pub fn load_default() -> Result<Self, StoreError> {
        let path = Self::default_path().ok_or_else(|| {
            StoreError::ServiceFile(format!(
                "{SERVICE_FILE_ENV} is not set and the home directory is unknown"
            ))
        })?;
        Self::load(&path)
    }

    /// Parse service file text. Lines outside any section, blank lines and
    /// `#`/`;` comments are skipped.
    pub fn parse(text: &str) -> Self {
        let mut services: Vec<(String, BTreeMap<String, String>)> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if !name.is_empty() && !name.contains(']') {
                    services.push((name.to_string(), BTreeMap::new()));
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if let Some((_, params)) = services.last_mut() {
                params.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Self {
            path: None,
            services,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Service names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Raw parameters of a service.
    pub fn parameters(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.services
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, params)| params)
    }

    /// Connection configuration for a named service.
    ///
    /// Reads `host`, `port`, `dbname`, `user`, `password`,
    /// `application_name` and `connect_timeout`; other keys are ignored. A
    /// service without `host` connects to `localhost`.
    pub fn service(&self, name: &str) -> Result<Config, StoreError> {
        let params = self.parameters(name).ok_or_else(|| {
            StoreError::ServiceFile(format!("Service '{name}' not found in service file"))
        })?;

        let mut config = Config::new();
        config.host(params.get("host").map(String::as_str).unwrap_or("localhost"));

        if let Some(port) = params.get("port") {
            let port: u16 = port.parse().map_err(|_| {
                StoreError::ServiceFile(format!("Service '{name}' has an invalid port: {port}"))
            })?;
            config.port(port);
        }
        if let Some(dbname) = params.get("dbname") {
            config.dbname(dbname);
        }
        if let Some(user) = params.get("user") {
            config.user(user);
        }
        if let Some(password) = params.get("password") {
            config.password(password);
        }
        if let Some(application_name) = params.get("application_name") {
            config.application_name(application_name);
        }
        if let Some(timeout) = params.get("connect_timeout") {
            let secs: u64 = timeout.parse().map_err(|_| {
                StoreError::ServiceFile(format!(
                    "Service '{name}' has an invalid connect_timeout: {timeout}"
                ))
            })?;
            config.connect_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
# production databases
[gis]
host=db.internal
port=5433
dbname=gis
user=etl
password=secret
sslmode=disable

; staging
[staging]
host = staging.internal
dbname = gis_staging
";

    #[test]
    fn test_names_in_file_order() {
        let file = PgServiceFile::parse(SAMPLE);
        assert_eq!(file.names(), vec!["gis", "staging"]);
    }

    #[test]
    fn test_service_config() {
        let file = PgServiceFile::parse(SAMPLE);
        let config = file.service("gis").unwrap();
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_dbname(), Some("gis"));
        assert_eq!(config.get_user(), Some("etl"));
        assert_eq!(config.get_password(), Some(b"secret".as_slice()));
    }

    #[test]
    fn test_spaces_around_equals() {
        let file = PgServiceFile::parse(SAMPLE);
        let params = file.parameters("staging").unwrap();
        assert_eq!(params.get("host").map(String::as_str), Some("staging.internal"));
        assert_eq!(
            file.service("staging").unwrap().get_dbname(),
            Some("gis_staging")
        );
    }

    #[test]
    fn test_missing_service() {
        let file = PgServiceFile::parse(SAMPLE);
        let err = file.service("reporting").unwrap_err();
        assert!(matches!(err, StoreError::ServiceFile(ref m) if m.contains("reporting")));
    }

    #[test]
    fn test_invalid_port() {
        let file = PgServiceFile::parse("[bad]\nport=abc\n");
        assert!(file.service("bad").is_err());
    }

    #[test]
    fn test_keys_before_first_section_are_ignored() {
        let file = PgServiceFile::parse("host=nowhere\n[only]\ndbname=x\n");
        assert_eq!(file.names(), vec!["only"]);
        assert!(file.parameters("only").unwrap().get("host").is_none());
    }

    #[test]
    fn test_service_file_env_wins() {
        let path = resolve_path(
            Some(OsString::from("/etc/pg/services.conf")),
            Some(PathBuf::from("/home/gis")),
        );
        assert_eq!(path, Some(PathBuf::from("/etc/pg/services.conf")));
    }

    #[test]
    fn test_home_service_file() {
        assert_eq!(
            resolve_path(None, Some(PathBuf::from("/home/gis"))),
            Some(PathBuf::from("/home/gis/.pg_service.conf"))
        );
        assert_eq!(
            resolve_path(Some(OsString::new()), Some(PathBuf::from("/home/gis"))),
            Some(PathBuf::from("/home/gis/.pg_service.conf"))
        );
        assert_eq!(resolve_path(None, None), None);
    }
}
