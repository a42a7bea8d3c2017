//! End-to-end runs through the orchestrator

use crate::common::{
    artifact_path, orchestrator, requested_pages, temp_dir, test_config, wait_for_state,
    CatalogResponder, LISTING_PATH,
};
use catalog_harvester::config::Config;
use catalog_harvester::output::load_history;
use catalog_harvester::storage::open_storage;
use catalog_harvester::{ErrorKind, JobError, JobKind, JobState, ScheduleSpec, Trigger};
use chrono::Timelike;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn catalog(responder: CatalogResponder) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

/// Points the indexing signal at `/embed` on the mock server
fn with_signal(mut config: Config, server: &MockServer) -> Config {
    config.embedding.server = Some(server.uri());
    config.embedding.endpoint = "/embed".to_string();
    config.embedding.method = "POST".to_string();
    config
}

async fn pages_requested(server: &MockServer) -> Vec<u32> {
    requested_pages(&server.received_requests().await.unwrap())
}

#[tokio::test]
async fn test_page_cap_completes_and_signals() {
    let server = catalog(CatalogResponder::default()).await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = temp_dir();
    let config = with_signal(test_config(&server.uri(), dir.path()), &server);
    let artifact = artifact_path(&config, JobKind::Full);
    let orch = orchestrator(config.clone());

    orch.start(JobKind::Full).unwrap();
    let mut outcome = orch.wait(JobKind::Full).await.unwrap();
    outcome.upload.take().unwrap().await.unwrap();

    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(outcome.pages_done, 3);
    assert_eq!(outcome.items_collected, 6);
    assert_eq!(pages_requested(&server).await, vec![1, 2, 3]);

    let written: Value = serde_json::from_str(&std::fs::read_to_string(artifact).unwrap()).unwrap();
    assert_eq!(written.as_array().unwrap().len(), 6);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    let history = load_history(&storage, 10).unwrap();
    let run = history.last_run(JobKind::Full).unwrap();
    assert_eq!(run.final_state, JobState::Completed);
    assert_eq!(run.pages_done, 3);
    assert_eq!(run.config_hash, "integration");
}

#[tokio::test]
async fn test_empty_pages_end_walk() {
    let server = catalog(CatalogResponder {
        empty_from: Some(3),
        ..CatalogResponder::default()
    })
    .await;

    let dir = temp_dir();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawler.page_cap = None;
    let orch = orchestrator(config);

    orch.start(JobKind::Price).unwrap();
    let outcome = orch.wait(JobKind::Price).await.unwrap();

    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(pages_requested(&server).await, vec![1, 2, 3, 4]);
    assert_eq!(outcome.items_collected, 4);
}

#[tokio::test]
async fn test_rejected_page_fails_without_upload() {
    let server = catalog(CatalogResponder {
        reject_page: Some(2),
        ..CatalogResponder::default()
    })
    .await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = temp_dir();
    let config = with_signal(test_config(&server.uri(), dir.path()), &server);
    let artifact = artifact_path(&config, JobKind::NonPrice);
    let orch = orchestrator(config);

    orch.start(JobKind::NonPrice).unwrap();
    let outcome = orch.wait(JobKind::NonPrice).await.unwrap();

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(outcome.pages_done, 1);
    assert!(outcome.upload.is_none());
    assert_eq!(outcome.error.unwrap().kind, ErrorKind::ClientRejected);
    assert_eq!(pages_requested(&server).await, vec![1, 2]);
    assert!(!artifact.exists());

    let status = orch.status(JobKind::NonPrice);
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.last_error_kind, Some(ErrorKind::ClientRejected));
}

#[tokio::test]
async fn test_concurrent_start_admits_one() {
    let server = catalog(CatalogResponder {
        delay: Duration::from_millis(50),
        ..CatalogResponder::default()
    })
    .await;
    let dir = temp_dir();
    let orch = orchestrator(test_config(&server.uri(), dir.path()));

    let (first, second) = tokio::join!(
        async { orch.start(JobKind::Full) },
        async { orch.start(JobKind::Full) }
    );
    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(JobError::Busy(JobKind::Full)))));

    let outcome = orch.wait(JobKind::Full).await.unwrap();
    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(pages_requested(&server).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_pause_resume_fetches_each_page_once() {
    let server = catalog(CatalogResponder {
        delay: Duration::from_millis(100),
        ..CatalogResponder::default()
    })
    .await;
    let dir = temp_dir();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawler.page_cap = Some(4);
    let orch = orchestrator(config);

    orch.start(JobKind::Price).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    orch.pause(JobKind::Price).unwrap();
    assert!(wait_for_state(&orch, JobKind::Price, JobState::Paused).await);

    let parked_at = pages_requested(&server).await.len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pages_requested(&server).await.len(), parked_at);

    orch.resume(JobKind::Price).unwrap();
    let outcome = orch.wait(JobKind::Price).await.unwrap();

    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(pages_requested(&server).await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_stop_keeps_partial_output() {
    let server = catalog(CatalogResponder {
        delay: Duration::from_millis(100),
        ..CatalogResponder::default()
    })
    .await;
    let dir = temp_dir();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawler.page_cap = Some(50);
    let artifact = artifact_path(&config, JobKind::Full);
    let orch = orchestrator(config);

    orch.start(JobKind::Full).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    orch.stop(JobKind::Full).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), orch.wait(JobKind::Full))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.state, JobState::Stopped);
    assert!(outcome.pages_done >= 1);
    assert!(outcome.pages_done < 50);
    assert!(artifact.exists());
    assert_eq!(orch.status(JobKind::Full).state, JobState::Stopped);
    // A stopped run cannot be resumed
    assert!(orch.resume(JobKind::Full).is_err());
}

#[tokio::test]
async fn test_disabled_scheduler_does_not_fire() {
    let server = catalog(CatalogResponder::default()).await;
    let dir = temp_dir();
    let orch = std::sync::Arc::new(orchestrator(test_config(&server.uri(), dir.path())));

    let minute = orch.scheduler().now().minute();
    orch.set_schedule(vec![ScheduleSpec::new(
        JobKind::Price,
        Trigger::EveryHourAt(minute),
    )])
    .unwrap();
    orch.disable_scheduler();
    orch.spawn_timer(Duration::from_millis(10));

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(orch.status(JobKind::Price).state, JobState::Idle);
    assert!(pages_requested(&server).await.is_empty());
    assert!(orch.shutdown().await.is_empty());
}
