use catalog_harvester::config::{BackoffKind, Config};
use catalog_harvester::{JobKind, JobState, Orchestrator};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{Request, Respond, ResponseTemplate};

pub const LISTING_PATH: &str = "/disp/category.ssg";

/// One product card in the catalog's listing markup
pub fn card(item_id: &str) -> String {
    format!(
        r#"<li>
            <div class="mnemitem_thmb_v2">
                <a href="/item/itemView.ssg?itemId={item_id}"><img src="//sitem.ssgcdn.com/{item_id}_i1_290.jpg"></a>
            </div>
            <div class="mnemitem_tit">
                <span class="mnemitem_goods_brand">Farm</span>
                <span class="mnemitem_goods_tit">Item {item_id}</span>
            </div>
            <div class="mnemitem_pricewrap_v2">
                <div class="new_price"><em>9,900</em></div>
            </div>
        </li>"#
    )
}

/// A listing page; no cards makes it an empty page
pub fn listing(item_ids: &[String]) -> String {
    let cards: Vec<String> = item_ids.iter().map(|id| card(id)).collect();
    format!(
        r#"<html><body><div id="ty_thmb_view"><ul>{}</ul></div></body></html>"#,
        cards.join("")
    )
}

/// Serves two items per page, with optional empty tail, rejection and latency
#[derive(Debug, Clone, Default)]
pub struct CatalogResponder {
    /// Pages at or after this number are empty
    pub empty_from: Option<u32>,
    /// This page answers 403
    pub reject_page: Option<u32>,
    pub delay: Duration,
}

impl Respond for CatalogResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let category = query.get("dispCtgId").cloned().unwrap_or_default();
        let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);

        if self.reject_page == Some(page) {
            return ResponseTemplate::new(403);
        }

        let ids = match self.empty_from {
            Some(from) if page >= from => Vec::new(),
            _ => vec![
                format!("{}{:03}1", category, page),
                format!("{}{:03}2", category, page),
            ],
        };
        ResponseTemplate::new(200)
            .set_body_string(listing(&ids))
            .insert_header("content-type", "text/html; charset=utf-8")
            .set_delay(self.delay)
    }
}

/// Page numbers requested from the mock catalog, in arrival order
pub fn requested_pages(requests: &[Request]) -> Vec<u32> {
    requests
        .iter()
        .filter(|r| r.url.path() == LISTING_PATH)
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
        })
        .collect()
}

/// A config pointing at `base_url`, writing under `dir`, with fast retries
pub fn test_config(base_url: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.base_url = base_url.to_string();
    config.crawler.page_delay_secs = 0.0;
    config.crawler.page_cap = Some(3);
    config.crawler.empty_page_stop = 2;
    config.crawler.request_timeout_secs = 5;

    config.retry.max_attempts = 3;
    config.retry.backoff = BackoffKind::Fixed;
    config.retry.initial_backoff_ms = 10;
    config.retry.max_backoff_ms = 20;

    config.output.directory = dir.join("out").to_string_lossy().into_owned();
    config.output.database_path = dir.join("harvester.db").to_string_lossy().into_owned();
    config.output.categories_path = dir.join("categories.json").to_string_lossy().into_owned();
    config.schedule.enabled = false;
    config.upload.max_attempts = 1;
    config.upload.retry_delay_secs = 0;
    config
}

/// Writes a one-category map and builds the orchestrator from `config`
pub fn orchestrator(config: Config) -> Orchestrator {
    std::fs::write(&config.output.categories_path, r#"{"Fruits": "100"}"#).unwrap();
    Orchestrator::from_config(config, "integration".to_string()).unwrap()
}

pub fn artifact_path(config: &Config, kind: JobKind) -> PathBuf {
    Path::new(&config.output.directory)
        .join(kind.output_dir())
        .join("Fruits.json")
}

pub fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

/// Polls until `kind` reaches `state` or two seconds pass
pub async fn wait_for_state(orch: &Orchestrator, kind: JobKind, state: JobState) -> bool {
    for _ in 0..200 {
        if orch.status(kind).state == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
