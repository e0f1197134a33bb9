use feature_sync_postgresql::{PgServiceFile, StoreError};
use std::io::Write;

#[test]
fn test_load_service_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[warehouse]\nhost=10.0.0.5\nport=6432\ndbname=warehouse\nuser=loader\n\n[empty]\n"
    )
    .unwrap();

    let services = PgServiceFile::load(file.path()).unwrap();
    assert_eq!(services.path(), Some(file.path()));
    assert_eq!(services.names(), vec!["warehouse", "empty"]);

    let config = services.service("warehouse").unwrap();
    assert_eq!(config.get_ports(), &[6432]);
    assert_eq!(config.get_dbname(), Some("warehouse"));
    assert_eq!(config.get_user(), Some("loader"));

    let defaults = services.service("empty").unwrap();
    assert_eq!(defaults.get_dbname(), None);
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = PgServiceFile::load(&dir.path().join("absent.conf")).unwrap_err();
    assert!(matches!(err, StoreError::ServiceFile(_)));
}
