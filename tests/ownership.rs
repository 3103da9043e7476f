mod common;

use common::*;
use tdms_analytics_core::{auth::OwnershipGuard, Error, WindowRequest};
use uuid::Uuid;

async fn setup(owner: Option<&str>) -> (Harness, Uuid, Uuid) {
    let h = harness().await;
    let report = h
        .ingestor
        .ingest(&reader(vec![time_channel("g", "v", 50)]), "f.tdms", owner)
        .await
        .unwrap();
    let channel_id = report.channels[0].channel_id;
    (h, report.dataset_id, channel_id)
}

#[tokio::test]
async fn test_owner_can_read() {
    let (h, _, channel_id) = setup(Some("alice")).await;
    let result = h
        .engine
        .fetch(&WindowRequest::new(channel_id), Some("alice"))
        .await
        .unwrap();
    assert_eq!(result.returned_points, 50);
}

#[tokio::test]
async fn test_other_caller_is_forbidden() {
    let (h, dataset_id, channel_id) = setup(Some("alice")).await;

    let err = h
        .engine
        .fetch(&WindowRequest::new(channel_id), Some("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let err = h.engine.time_range(channel_id, None).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let guard = OwnershipGuard::new(h.catalog.clone());
    let err = guard.authorize_dataset(dataset_id, Some("bob")).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_missing_channel_is_not_found_for_anyone() {
    let (h, _, _) = setup(Some("alice")).await;
    for caller in [Some("alice"), Some("bob"), None] {
        let err = h
            .engine
            .fetch(&WindowRequest::new(Uuid::new_v4()), caller)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

#[tokio::test]
async fn test_unowned_dataset_is_shared() {
    let (h, dataset_id, channel_id) = setup(None).await;
    for caller in [Some("alice"), Some("bob"), None] {
        h.engine
            .fetch(&WindowRequest::new(channel_id), caller)
            .await
            .unwrap();
    }
    let range = h.engine.time_range(channel_id, Some("bob")).await.unwrap();
    assert_eq!(range.total_points, 50);

    let guard = OwnershipGuard::new(h.catalog.clone());
    assert!(guard.authorize_dataset(dataset_id, Some("bob")).await.is_ok());
}
