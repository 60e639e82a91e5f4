#![allow(clippy::unwrap_used, clippy::missing_panics_doc, unreachable_pub)]
use ephemera_server::AppBuilder;
use ephemera_server::adapters::storage::{MemoryMessageStore, MessageStore, ReadPolicy};
use ephemera_server::domain::clock::{Clock, ManualClock};
use ephemera_server::workers::MessageCleanupWorker;
use reqwest::StatusCode;
use std::sync::Arc;
use time::Duration;

mod common;

#[tokio::test]
async fn test_cleanup_removes_only_expired_messages() {
    let clock = Arc::new(ManualClock::new(common::START));
    let store = Arc::new(MemoryMessageStore::new(Arc::clone(&clock) as Arc<dyn Clock>, ReadPolicy::Repeatable));
    let app = AppBuilder::new(common::get_test_config())
        .with_store(Arc::clone(&store) as Arc<dyn MessageStore>)
        .build()
        .unwrap();
    let worker = MessageCleanupWorker::new(app.message_service.clone());

    let old = app.message_service.create_message("old", "http://localhost").await.unwrap();
    clock.advance(Duration::hours(6));
    let fresh = app.message_service.create_message("fresh", "http://localhost").await.unwrap();

    assert_eq!(worker.perform_cleanup().await.unwrap(), 0, "nothing has expired yet");
    assert_eq!(store.len(), 2);

    clock.advance(Duration::hours(7));
    assert_eq!(worker.perform_cleanup().await.unwrap(), 1);
    assert_eq!(store.len(), 1);

    assert!(app.message_service.fetch_message(&old.id.to_string()).await.is_err());
    assert!(app.message_service.fetch_message(&fresh.id.to_string()).await.is_ok());
}

#[tokio::test]
async fn test_background_reaper_purges_unread_messages() {
    let mut config = common::get_test_config();
    config.messaging.cleanup_interval_secs = 1;
    let app = common::TestApp::spawn_with_config(config).await;

    app.create_ok("never read").await;
    app.create_ok("also never read").await;
    assert_eq!(app.store.len(), 2);

    app.clock.advance(Duration::hours(12) + Duration::seconds(1));

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !app.store.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "reaper did not purge expired messages");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn test_reaped_message_reads_as_not_found() {
    let mut config = common::get_test_config();
    config.messaging.cleanup_interval_secs = 1;
    let app = common::TestApp::spawn_with_config(config).await;

    let created = app.create_ok("gone").await;
    let id = created["id"].as_str().unwrap();
    app.clock.advance(Duration::days(1));

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !app.store.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "reaper did not run");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    assert_eq!(app.fetch(id).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let app = common::TestApp::spawn().await;
    app.shutdown();

    for worker in app.workers {
        tokio::time::timeout(std::time::Duration::from_secs(2), worker).await.unwrap().unwrap();
    }
}
