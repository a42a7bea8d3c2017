//! Product image download
//!
//! Runs after a category of a full harvest has been written. Each image is
//! checked with a HEAD request first and skipped when a file of the same
//! non-zero size is already stored.

use crate::categories::Category;
use crate::crawler::parser::ItemRecord;
use crate::jobs::ControlToken;
use crate::output::OutputSink;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Thumbnail size suffixes the catalog appends to image names
const SIZE_SUFFIXES: &[&str] = &["_i1_290", "_i1_580"];

/// Counts for one category's image pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The pass ended early on a stop request
    pub cancelled: bool,
}

/// Downloads product images through an [`OutputSink`]
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    client: Client,
    delay: Duration,
}

impl ImageDownloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            delay: Duration::from_millis(100),
        }
    }

    /// Pause between two images
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn download_category(
        &self,
        sink: &dyn OutputSink,
        category: &Category,
        items: &[ItemRecord],
        control: &mut ControlToken,
    ) -> ImageReport {
        let mut report = ImageReport::default();

        for (index, item) in items.iter().enumerate() {
            if index > 0 && !control.sleep(self.delay).await {
                report.cancelled = true;
                break;
            }
            if !control.proceed().await {
                report.cancelled = true;
                break;
            }

            let Some(image_url) = item.get("image_url").and_then(Value::as_str) else {
                continue;
            };
            if image_url.is_empty() {
                continue;
            }
            let fallback_id = item.get("id").and_then(Value::as_str).unwrap_or("image");
            let file_name = image_file_name(image_url)
                .unwrap_or_else(|| format!("{}.jpg", fallback_id));

            match self.download_one(sink, category, image_url, &file_name).await {
                Ok(true) => report.downloaded += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(category = %category.name, "Image {} failed: {}", image_url, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            category = %category.name,
            "Images: {} downloaded, {} unchanged, {} failed",
            report.downloaded,
            report.skipped,
            report.failed
        );
        report
    }

    /// Returns `Ok(false)` when the stored copy is already current
    async fn download_one(
        &self,
        sink: &dyn OutputSink,
        category: &Category,
        image_url: &str,
        file_name: &str,
    ) -> Result<bool, String> {
        let head = self
            .client
            .head(image_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        let expected_size = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        if expected_size > 0 && sink.image_size(category, file_name) == Some(expected_size) {
            return Ok(false);
        }

        let bytes = self
            .client
            .get(image_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?
            .bytes()
            .await
            .map_err(|e| e.to_string())?;

        sink.save_image(category, file_name, &bytes)
            .map_err(|e| e.to_string())?;
        Ok(true)
    }
}

/// Last path segment of the image URL without size suffixes
fn image_file_name(image_url: &str) -> Option<String> {
    let path = match Url::parse(image_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => image_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let mut name = path.rsplit('/').next()?.to_string();
    for suffix in SIZE_SUFFIXES {
        name = name.replace(suffix, "");
    }
    (!name.is_empty()).then_some(name)
}
