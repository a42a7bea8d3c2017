//! URL handling for the catalog and the indexing signal
//!
//! This module builds catalog listing URLs, resolves links found in catalog
//! markup, and cleans up operator-supplied target URLs.

mod catalog;

pub use catalog::{absolutize, catalog_page_url, extract_item_id};

use crate::UrlError;
use url::Url;

/// Joins an indexing server origin and endpoint into a usable URL
///
/// Operator-edited values often arrive wrapped in quotes or with a trailing
/// slash; both are removed before joining. The endpoint gains a leading
/// slash when it lacks one.
///
/// # Examples
///
/// ```
/// use catalog_harvester::url::sanitize_target_url;
///
/// let url = sanitize_target_url("\"http://localhost:8000/\"", "reindex").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8000/reindex");
/// ```
pub fn sanitize_target_url(server: &str, endpoint: &str) -> Result<Url, UrlError> {
    let server = trim_quotes(server);
    let server = server.trim_end_matches('/');

    let endpoint = trim_quotes(endpoint);
    let joined = if endpoint.is_empty() {
        format!("{}/", server)
    } else if endpoint.starts_with('/') {
        format!("{}{}", server, endpoint)
    } else {
        format!("{}/{}", server, endpoint)
    };

    let url = Url::parse(&joined).map_err(|e| UrlError::Parse(format!("{}: {}", joined, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    Ok(url)
}

/// Whether a URL points at the local machine
pub fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
}

fn trim_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}
