//! HTTP page fetcher
//!
//! This module handles every catalog request, including:
//! - Building the HTTP client with browser-like identification headers
//! - Classifying failures into transient, rejected and structural
//! - Retrying transient failures with backoff, watching for stop requests

use crate::config::{Config, UserAgentConfig};
use crate::crawler::parser::{CatalogParser, ItemRecord, ParsedListing};
use crate::crawler::retry::RetryPolicy;
use crate::jobs::ControlToken;
use crate::state::JobKind;
use crate::url::catalog_page_url;
use crate::{ErrorKind, FetchError, HarvestError, UrlError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// One page to fetch; constructed per fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub category_id: String,
    /// Category name stamped into every record
    pub category_name: String,
    pub page_number: u32,
    pub page_size: Option<u32>,
    pub kind: JobKind,
}

/// Outcome of fetching one page
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page_number: u32,
    pub items: Vec<ItemRecord>,
    pub is_empty: bool,
    /// Pagination hint from the page markup
    pub has_next: Option<bool>,
    pub fetch_error: Option<FetchError>,
}

impl PageResult {
    pub fn ok(page_number: u32, items: Vec<ItemRecord>, has_next: Option<bool>) -> Self {
        Self {
            page_number,
            is_empty: items.is_empty(),
            items,
            has_next,
            fetch_error: None,
        }
    }

    pub fn failed(page_number: u32, error: FetchError) -> Self {
        Self {
            page_number,
            items: Vec::new(),
            is_empty: true,
            has_next: None,
            fetch_error: Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.fetch_error.as_ref().map(|e| e.kind)
    }
}

/// Source of catalog pages
///
/// `control` is consulted between retry attempts so a stop request does not
/// wait out the whole retry budget.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, request: &PageRequest, control: &mut ControlToken) -> PageResult;
}

/// Builds an HTTP client with the configured identification headers
///
/// # Example
///
/// ```no_run
/// use catalog_harvester::config::UserAgentConfig;
/// use catalog_harvester::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(15)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    Client::builder()
        .user_agent(config.value.clone())
        .default_headers(headers)
        .timeout(request_timeout)
        .connect_timeout(request_timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// A failed attempt plus the server's retry hint, if any
struct AttemptError {
    error: FetchError,
    retry_after: Option<Duration>,
}

impl From<FetchError> for AttemptError {
    fn from(error: FetchError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Fetches and parses catalog listing pages over HTTP
#[derive(Debug)]
pub struct HttpPageFetcher {
    client: Client,
    parser: CatalogParser,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpPageFetcher {
    pub fn new(config: &Config) -> Result<Self, HarvestError> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawler.request_timeout_secs),
        )?;
        Self::with_client(
            client,
            &config.crawler.base_url,
            RetryPolicy::from_config(&config.retry),
        )
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        retry: RetryPolicy,
    ) -> Result<Self, HarvestError> {
        let base = Url::parse(base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
        Ok(Self {
            client,
            parser: CatalogParser::new(base)?,
            base_url: base_url.to_string(),
            retry,
        })
    }

    async fn fetch_once(&self, request: &PageRequest) -> Result<ParsedListing, AttemptError> {
        let url = catalog_page_url(
            &self.base_url,
            &request.category_id,
            request.page_number,
            request.page_size,
        )
        .map_err(|e| FetchError {
            kind: ErrorKind::ClientRejected,
            message: e.to_string(),
            status: None,
        })?;

        tracing::debug!(
            category = %request.category_name,
            page = request.page_number,
            "GET {}",
            url
        );

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttemptError::from(classify_send_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, response.headers()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transient(format!("failed to read body: {}", e)))?;

        let last_updated = chrono::Local::now()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        self.parser
            .parse(&body, &request.category_name, request.kind, &last_updated)
            .map_err(|e| AttemptError::from(FetchError::parse(format!("{} ({})", e.message, url))))
    }
}

#[async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch(&self, request: &PageRequest, control: &mut ControlToken) -> PageResult {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let failure = match self.fetch_once(request).await {
                Ok(listing) => {
                    return PageResult::ok(request.page_number, listing.items, listing.has_next)
                }
                Err(failure) => failure,
            };

            if !self.retry.should_retry(attempts, &failure.error) {
                if failure.error.is_retryable() {
                    tracing::warn!(
                        category = %request.category_name,
                        page = request.page_number,
                        "Giving up after {} attempts: {}",
                        attempts,
                        failure.error
                    );
                }
                return PageResult::failed(request.page_number, failure.error);
            }

            let delay = self.retry.delay_for(attempts, failure.retry_after);
            tracing::warn!(
                category = %request.category_name,
                page = request.page_number,
                "Attempt {} failed ({}), retrying in {:?}",
                attempts,
                failure.error,
                delay
            );

            if !control.sleep(delay).await {
                tracing::info!(page = request.page_number, "Stop requested during retry backoff");
                return PageResult::failed(request.page_number, failure.error);
            }
        }
    }
}

fn classify_send_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::transient("request timeout")
    } else if error.is_connect() {
        FetchError::transient(format!("connection failed: {}", error))
    } else {
        FetchError::transient(error.to_string())
    }
}

fn classify_status(status: StatusCode, headers: &HeaderMap) -> AttemptError {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("unknown status");

    if status == StatusCode::TOO_MANY_REQUESTS {
        return AttemptError {
            error: FetchError::transient(format!("HTTP {} {}", code, reason)).with_status(code),
            retry_after: parse_retry_after(headers),
        };
    }

    if status.is_server_error() {
        return FetchError::transient(format!("HTTP {} {}", code, reason))
            .with_status(code)
            .into();
    }

    FetchError::client_rejected(code, format!("HTTP {} {}", code, reason)).into()
}

/// Reads the seconds form of `Retry-After`
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_classify_status() {
        let headers = HeaderMap::new();

        let e = classify_status(StatusCode::FORBIDDEN, &headers).error;
        assert_eq!(e.kind, ErrorKind::ClientRejected);
        assert_eq!(e.status, Some(403));

        let e = classify_status(StatusCode::BAD_GATEWAY, &headers).error;
        assert_eq!(e.kind, ErrorKind::TransientNetwork);
        assert_eq!(e.status, Some(502));

        let e = classify_status(StatusCode::NOT_FOUND, &headers).error;
        assert_eq!(e.kind, ErrorKind::ClientRejected);
    }

    #[test]
    fn test_rate_limit_is_transient_with_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let attempt = classify_status(StatusCode::TOO_MANY_REQUESTS, &headers);
        assert_eq!(attempt.error.kind, ErrorKind::TransientNetwork);
        assert_eq!(attempt.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_date_form_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_page_result_constructors() {
        let ok = PageResult::ok(3, Vec::new(), Some(false));
        assert!(ok.is_empty);
        assert_eq!(ok.error_kind(), None);

        let failed = PageResult::failed(2, FetchError::client_rejected(403, "Forbidden"));
        assert_eq!(failed.error_kind(), Some(ErrorKind::ClientRejected));
    }
}
