//! PostgreSQL -> feature service runs against in-memory doubles.

use feature_sync::config::ReverseConfig;
use feature_sync::progress::{Level, Progress};
use feature_sync::reverse::transfer_to_service;
use feature_sync::testing::{
    drain, point_layer, source_row, FakeFeatureService, FakePortal, FakeStore,
};
use feature_sync_postgresql::ColumnInfo;

const LAYER: &str = "https://services.example.com/arcgis/rest/services/Parcels/FeatureServer/0";

fn store(rows: usize) -> FakeStore {
    FakeStore {
        primary_key: Some("id".to_string()),
        columns: vec![
            ColumnInfo::new("id", "integer", "int4"),
            ColumnInfo::new("name", "character varying", "varchar"),
            ColumnInfo::new("geom", "USER-DEFINED", "geometry"),
        ],
        geometry_type: Some("POINT".to_string()),
        rows: (1..=rows as i64).map(source_row).collect(),
        ..Default::default()
    }
}

fn config(batch_size: usize, truncate: bool) -> ReverseConfig {
    ReverseConfig {
        service: "gis".to_string(),
        table: "parcels".to_string(),
        layer_url: Some(LAYER.to_string()),
        batch_size,
        truncate,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_batches_continue_past_failure() {
    let service = FakeFeatureService::new(point_layer(3857)).with_failing_batches(&[1]);
    let portal = FakePortal::default();
    let source = store(250);
    let (progress, mut lines) = Progress::channel(1024, false);

    let summary = transfer_to_service(&service, &portal, &source, &config(100, false), &progress)
        .await
        .unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.submitted, 150);
    assert_eq!(
        service.events(),
        vec!["add_features:100", "add_features:100", "add_features:50"]
    );

    let lines = drain(&mut lines);
    assert!(lines
        .iter()
        .any(|l| l.level == Level::Error && l.message.contains("100 to 200 of 250")));
    assert!(lines
        .iter()
        .any(|l| l.message == "Successfully added features 200 to 250 of 250"));
}

#[tokio::test]
async fn test_truncate_runs_before_first_batch() {
    let service = FakeFeatureService::new(point_layer(3857));
    let portal = FakePortal::default();
    let source = store(3);

    transfer_to_service(&service, &portal, &source, &config(2, true), &Progress::silent())
        .await
        .unwrap();

    assert_eq!(
        service.events(),
        vec!["delete_all", "add_features:2", "add_features:1"]
    );
}

#[tokio::test]
async fn test_truncate_failure_is_reported_and_run_continues() {
    let service = FakeFeatureService {
        fail_delete: true,
        ..FakeFeatureService::new(point_layer(3857))
    };
    let portal = FakePortal::default();
    let source = store(1);
    let (progress, mut lines) = Progress::channel(1024, false);

    let summary = transfer_to_service(&service, &portal, &source, &config(100, true), &progress)
        .await
        .unwrap();

    assert_eq!(summary.submitted, 1);
    assert!(drain(&mut lines)
        .iter()
        .any(|l| l.level == Level::Error && l.message.starts_with("Failed to delete features")));
}

#[tokio::test]
async fn test_missing_layer_creates_service() {
    let service = FakeFeatureService {
        missing_layer: true,
        ..FakeFeatureService::new(point_layer(3857))
    };
    let portal = FakePortal::default();
    let source = store(2);

    transfer_to_service(&service, &portal, &source, &config(100, false), &Progress::silent())
        .await
        .unwrap();

    let created = portal.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "parcels_Feature_Service");
    assert_eq!(created[0].geometry_type, "esriGeometryPoint");
    assert_eq!(created[0].wkid, Some(3857));
    let names: Vec<&str> = created[0].fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name"]);
    assert_eq!(service.events(), vec!["add_features:2"]);
}

#[tokio::test]
async fn test_no_url_creates_service() {
    let service = FakeFeatureService::new(point_layer(3857));
    let portal = FakePortal::default();
    let source = store(1);

    let config = ReverseConfig {
        layer_url: None,
        ..config(100, false)
    };
    transfer_to_service(&service, &portal, &source, &config, &Progress::silent())
        .await
        .unwrap();

    assert_eq!(portal.created().len(), 1);
}

#[tokio::test]
async fn test_auth_failure_reads_nothing() {
    let service = FakeFeatureService {
        fail_auth: true,
        ..FakeFeatureService::new(point_layer(3857))
    };
    let portal = FakePortal::default();
    let source = store(5);

    let err = transfer_to_service(&service, &portal, &source, &config(100, true), &Progress::silent())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("Failed to obtain token"));
    assert!(service.events().is_empty());
    assert!(portal.created().is_empty());
}
