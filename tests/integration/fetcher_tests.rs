//! Page fetcher against a mock catalog

use crate::common::{temp_dir, test_config, CatalogResponder, LISTING_PATH};
use catalog_harvester::config::BackoffKind;
use catalog_harvester::crawler::{HttpPageFetcher, PageRequest, PageSource};
use catalog_harvester::jobs::JobControl;
use catalog_harvester::{ControlToken, ErrorKind, JobKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(page_number: u32) -> PageRequest {
    PageRequest {
        category_id: "100".to_string(),
        category_name: "Fruits".to_string(),
        page_number,
        page_size: None,
        kind: JobKind::Full,
    }
}

async fn fetcher(server: &MockServer) -> HttpPageFetcher {
    let dir = temp_dir();
    HttpPageFetcher::new(&test_config(&server.uri(), dir.path())).unwrap()
}

#[tokio::test]
async fn test_fetch_parses_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("dispCtgId", "100"))
        .and(query_param("page", "4"))
        .respond_with(CatalogResponder::default())
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .await
        .fetch(&request(4), &mut ControlToken::detached())
        .await;

    assert!(result.fetch_error.is_none());
    assert_eq!(result.page_number, 4);
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0]["id"], "1000041");
    assert_eq!(result.items[0]["category"], "Fruits");
    assert!(!result.is_empty);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(CatalogResponder::default())
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .await
        .fetch(&request(1), &mut ControlToken::detached())
        .await;

    assert!(result.fetch_error.is_none());
    assert_eq!(result.items.len(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_is_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .await
        .fetch(&request(1), &mut ControlToken::detached())
        .await;

    let error = result.fetch_error.unwrap();
    assert_eq!(error.kind, ErrorKind::TransientNetwork);
    assert_eq!(error.status, Some(502));
}

#[tokio::test]
async fn test_stop_interrupts_retry_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = temp_dir();
    let mut config = test_config(&server.uri(), dir.path());
    config.retry.backoff = BackoffKind::Fixed;
    config.retry.initial_backoff_ms = 10_000;
    config.retry.max_backoff_ms = 10_000;
    let fetcher = HttpPageFetcher::new(&config).unwrap();

    let control = Arc::new(JobControl::new());
    let mut token = control.token(None);
    let stopper = Arc::clone(&control);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    let started = Instant::now();
    let result = fetcher.fetch(&request(1), &mut token).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.error_kind(), Some(ErrorKind::TransientNetwork));
    assert_eq!(result.fetch_error.unwrap().status, Some(503));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_client_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .await
        .fetch(&request(2), &mut ControlToken::detached())
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ClientRejected));
    assert_eq!(result.fetch_error.unwrap().status, Some(403));
}

#[tokio::test]
async fn test_unrecognized_markup_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>maintenance</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .await
        .fetch(&request(1), &mut ControlToken::detached())
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ParseFailure));
}
