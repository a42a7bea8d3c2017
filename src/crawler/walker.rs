//! Pagination walker
//!
//! Drives a [`PageSource`] over one category's page range. The walk is pulled
//! one event at a time with [`PaginationWalker::next`], so the caller decides
//! what to persist and when, and [`PaginationWalker::restart`] begins a fresh
//! walk from the configured start page.

use crate::categories::Category;
use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{PageRequest, PageSource};
use crate::crawler::parser::ItemRecord;
use crate::jobs::ControlToken;
use crate::state::JobKind;
use crate::FetchError;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Page range and stop policy for one walk
#[derive(Debug, Clone, PartialEq)]
pub struct WalkConfig {
    pub start_page: u32,
    pub end_page: Option<u32>,
    /// Maximum pages fetched in one walk, regardless of `end_page`
    pub page_cap: Option<u32>,
    /// Consecutive empty pages that end the walk (0 disables)
    pub empty_page_stop: u32,
    /// Emit a checkpoint every N pages (0 disables)
    pub partial_save_every: u32,
    /// Inserted before every fetch except the first
    pub page_delay: Duration,
    pub page_size: Option<u32>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

impl From<&CrawlerConfig> for WalkConfig {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            start_page: config.start_page.max(1),
            end_page: config.end_page,
            page_cap: config.page_cap,
            empty_page_stop: config.empty_page_stop,
            partial_save_every: config.partial_save_every,
            page_delay: Duration::from_secs_f64(config.page_delay_secs.max(0.0)),
            page_size: config.page_size,
        }
    }
}

/// Why a walk ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndPage,
    PageCap,
    EmptyPages,
    /// The page markup says there is no next page
    LastPage,
    Cancelled,
}

impl StopReason {
    pub fn is_cancelled(self) -> bool {
        self == StopReason::Cancelled
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::EndPage => "end page reached",
            StopReason::PageCap => "page cap reached",
            StopReason::EmptyPages => "consecutive empty pages",
            StopReason::LastPage => "no next page",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One step of a walk
#[derive(Debug, Clone)]
pub enum WalkEvent {
    /// A page was fetched successfully
    Page {
        page: u32,
        items_on_page: usize,
        new_items: usize,
        total_items: usize,
    },
    /// Periodic snapshot of everything collected so far
    Checkpoint {
        last_completed_page: u32,
        items: Vec<ItemRecord>,
    },
    /// The walk ended under its stop policy
    Finished(StopReason),
    /// The walk ended on a non-retryable error, or exhausted retries
    Failed { page: u32, error: FetchError },
}

#[derive(Debug)]
struct WalkProgress {
    next_page: u32,
    pages_fetched: u32,
    requests_sent: u32,
    consecutive_empty: u32,
    last_completed_page: Option<u32>,
    items: Vec<ItemRecord>,
    seen_ids: HashSet<String>,
    queued: VecDeque<WalkEvent>,
    done: bool,
}

impl WalkProgress {
    fn new(start_page: u32) -> Self {
        Self {
            next_page: start_page,
            pages_fetched: 0,
            requests_sent: 0,
            consecutive_empty: 0,
            last_completed_page: None,
            items: Vec::new(),
            seen_ids: HashSet::new(),
            queued: VecDeque::new(),
            done: false,
        }
    }
}

/// Walks one category's pages in increasing order
pub struct PaginationWalker {
    source: Arc<dyn PageSource>,
    category: Category,
    kind: JobKind,
    config: WalkConfig,
    control: ControlToken,
    progress: WalkProgress,
}

impl fmt::Debug for PaginationWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationWalker")
            .field("category", &self.category)
            .field("kind", &self.kind)
            .field("next_page", &self.progress.next_page)
            .finish()
    }
}

impl PaginationWalker {
    pub fn new(
        source: Arc<dyn PageSource>,
        category: Category,
        kind: JobKind,
        config: WalkConfig,
        control: ControlToken,
    ) -> Self {
        let progress = WalkProgress::new(config.start_page);
        Self {
            source,
            category,
            kind,
            config,
            control,
            progress,
        }
    }

    /// Discards all progress; the next event comes from `start_page` again
    pub fn restart(&mut self) {
        self.progress = WalkProgress::new(self.config.start_page);
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    /// Pages fetched successfully so far in this walk
    pub fn pages_fetched(&self) -> u32 {
        self.progress.pages_fetched
    }

    pub fn last_completed_page(&self) -> Option<u32> {
        self.progress.last_completed_page
    }

    /// Items collected so far, de-duplicated, in page order
    pub fn items(&self) -> &[ItemRecord] {
        &self.progress.items
    }

    pub fn into_items(self) -> Vec<ItemRecord> {
        self.progress.items
    }

    /// Advances the walk by one event; `None` once it has ended
    pub async fn next(&mut self) -> Option<WalkEvent> {
        if let Some(event) = self.progress.queued.pop_front() {
            return Some(event);
        }
        if self.progress.done {
            return None;
        }

        if let Some(end) = self.config.end_page {
            if self.progress.next_page > end {
                return Some(self.finish(StopReason::EndPage));
            }
        }
        if let Some(cap) = self.config.page_cap {
            if self.progress.pages_fetched >= cap {
                return Some(self.finish(StopReason::PageCap));
            }
        }

        if self.progress.requests_sent > 0 && !self.control.sleep(self.config.page_delay).await {
            return Some(self.finish(StopReason::Cancelled));
        }
        if !self.control.proceed().await {
            return Some(self.finish(StopReason::Cancelled));
        }

        let page = self.progress.next_page;
        let request = PageRequest {
            category_id: self.category.id.clone(),
            category_name: self.category.name.clone(),
            page_number: page,
            page_size: self.config.page_size,
            kind: self.kind,
        };

        self.progress.requests_sent += 1;
        let result = self.source.fetch(&request, &mut self.control).await;

        if let Some(error) = result.fetch_error {
            if self.control.is_stopped() {
                return Some(self.finish(StopReason::Cancelled));
            }
            tracing::warn!(
                category = %self.category.name,
                page,
                "Walk failed: {}",
                error
            );
            self.progress.done = true;
            return Some(WalkEvent::Failed { page, error });
        }

        let items_on_page = result.items.len();
        let new_items = self.absorb(result.items);
        self.progress.pages_fetched += 1;
        self.progress.last_completed_page = Some(page);
        self.progress.next_page = page.saturating_add(1);

        tracing::info!(
            category = %self.category.name,
            page,
            "+{} items, {} total",
            new_items,
            self.progress.items.len()
        );

        // A page adding nothing unseen counts as empty, so a catalog that
        // keeps serving its last page still ends the walk
        if new_items == 0 {
            self.progress.consecutive_empty += 1;
        } else {
            self.progress.consecutive_empty = 0;
        }

        let every = self.config.partial_save_every;
        if every > 0 && self.progress.pages_fetched % every == 0 {
            self.progress.queued.push_back(WalkEvent::Checkpoint {
                last_completed_page: page,
                items: self.progress.items.clone(),
            });
        }

        let threshold = self.config.empty_page_stop;
        if threshold > 0 && self.progress.consecutive_empty >= threshold {
            let event = self.finish(StopReason::EmptyPages);
            self.progress.queued.push_back(event);
        } else if result.has_next == Some(false) {
            let event = self.finish(StopReason::LastPage);
            self.progress.queued.push_back(event);
        }

        Some(WalkEvent::Page {
            page,
            items_on_page,
            new_items,
            total_items: self.progress.items.len(),
        })
    }

    fn finish(&mut self, reason: StopReason) -> WalkEvent {
        self.progress.done = true;
        tracing::info!(
            category = %self.category.name,
            pages = self.progress.pages_fetched,
            "Walk finished: {}",
            reason
        );
        WalkEvent::Finished(reason)
    }

    /// Appends unseen items; items without an id are always kept
    fn absorb(&mut self, items: Vec<ItemRecord>) -> usize {
        let before = self.progress.items.len();
        for item in items {
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            if let Some(id) = id {
                if !self.progress.seen_ids.insert(id) {
                    continue;
                }
            }
            self.progress.items.push(item);
        }
        self.progress.items.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::PageResult;
    use crate::jobs::JobControl;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves scripted pages and records which pages were requested
    struct ScriptedSource {
        pages: Box<dyn Fn(u32) -> PageResult + Send + Sync>,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        fn new(pages: impl Fn(u32) -> PageResult + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                pages: Box::new(pages),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch(&self, request: &PageRequest, _control: &mut ControlToken) -> PageResult {
            self.requested.lock().unwrap().push(request.page_number);
            (self.pages)(request.page_number)
        }
    }

    fn item(id: &str) -> ItemRecord {
        match json!({ "id": id }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn full_page(page: u32) -> PageResult {
        let items = vec![item(&format!("p{}-a", page)), item(&format!("p{}-b", page))];
        PageResult::ok(page, items, None)
    }

    fn config() -> WalkConfig {
        WalkConfig {
            start_page: 1,
            end_page: None,
            page_cap: None,
            empty_page_stop: 2,
            partial_save_every: 0,
            page_delay: Duration::ZERO,
            page_size: None,
        }
    }

    fn category() -> Category {
        Category::new("Fruits", "6000213114")
    }

    fn walker(source: Arc<ScriptedSource>, config: WalkConfig) -> PaginationWalker {
        PaginationWalker::new(source, category(), JobKind::Full, config, ControlToken::detached())
    }

    async fn drain(walker: &mut PaginationWalker) -> Vec<WalkEvent> {
        let mut events = Vec::new();
        while let Some(event) = walker.next().await {
            events.push(event);
        }
        events
    }

    fn finish_reason(events: &[WalkEvent]) -> Option<StopReason> {
        events.iter().find_map(|e| match e {
            WalkEvent::Finished(reason) => Some(*reason),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_page_cap_bounds_fetches() {
        let source = ScriptedSource::new(full_page);
        let mut walker = walker(source.clone(), WalkConfig { page_cap: Some(3), ..config() });

        let events = drain(&mut walker).await;

        assert_eq!(source.requested(), vec![1, 2, 3]);
        assert_eq!(finish_reason(&events), Some(StopReason::PageCap));
        assert_eq!(walker.items().len(), 6);
    }

    #[tokio::test]
    async fn test_consecutive_empty_pages_stop_walk() {
        let source = ScriptedSource::new(|page| {
            if page <= 2 {
                full_page(page)
            } else {
                PageResult::ok(page, Vec::new(), None)
            }
        });
        let mut walker = walker(source.clone(), config());

        let events = drain(&mut walker).await;

        assert_eq!(source.requested(), vec![1, 2, 3, 4]);
        assert_eq!(finish_reason(&events), Some(StopReason::EmptyPages));
    }

    #[tokio::test]
    async fn test_empty_counter_resets_on_items() {
        // empty, full, empty, empty: only the last two count
        let source = ScriptedSource::new(|page| match page {
            2 => full_page(page),
            _ => PageResult::ok(page, Vec::new(), None),
        });
        let mut walker = walker(source.clone(), config());
        drain(&mut walker).await;
        assert_eq!(source.requested(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_repeated_last_page_counts_as_empty() {
        // Past page 2 the catalog keeps answering with page 2's items
        let source = ScriptedSource::new(|page| full_page(page.min(2)));
        let mut walker = walker(source.clone(), WalkConfig { page_cap: Some(20), ..config() });

        let events = drain(&mut walker).await;

        assert_eq!(source.requested(), vec![1, 2, 3, 4]);
        assert_eq!(finish_reason(&events), Some(StopReason::EmptyPages));
        assert_eq!(walker.items().len(), 4);
    }

    #[tokio::test]
    async fn test_end_page_is_inclusive() {
        let source = ScriptedSource::new(full_page);
        let mut walker = walker(
            source.clone(),
            WalkConfig {
                start_page: 3,
                end_page: Some(5),
                ..config()
            },
        );
        let events = drain(&mut walker).await;
        assert_eq!(source.requested(), vec![3, 4, 5]);
        assert_eq!(finish_reason(&events), Some(StopReason::EndPage));
    }

    #[tokio::test]
    async fn test_dom_last_page_hint_stops_walk() {
        let source = ScriptedSource::new(|page| {
            let mut result = full_page(page);
            result.has_next = Some(page < 2);
            result
        });
        let mut walker = walker(source.clone(), config());
        let events = drain(&mut walker).await;
        assert_eq!(source.requested(), vec![1, 2]);
        assert_eq!(finish_reason(&events), Some(StopReason::LastPage));
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces() {
        let source = ScriptedSource::new(|page| {
            if page == 2 {
                PageResult::failed(page, FetchError::client_rejected(403, "Forbidden"))
            } else {
                full_page(page)
            }
        });
        let mut walker = walker(source.clone(), config());
        let events = drain(&mut walker).await;

        assert_eq!(source.requested(), vec![1, 2]);
        assert!(matches!(
            events.last(),
            Some(WalkEvent::Failed { page: 2, error }) if error.status == Some(403)
        ));
        assert_eq!(walker.pages_fetched(), 1);
        assert_eq!(walker.last_completed_page(), Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_items_are_dropped() {
        let source = ScriptedSource::new(|page| {
            PageResult::ok(page, vec![item("same"), item(&format!("u{}", page)), item("")], None)
        });
        let mut walker = walker(source, WalkConfig { page_cap: Some(2), ..config() });
        let events = drain(&mut walker).await;

        let new_counts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                WalkEvent::Page { new_items, .. } => Some(*new_items),
                _ => None,
            })
            .collect();
        assert_eq!(new_counts, vec![3, 2]);
        assert_eq!(walker.items().len(), 5);
    }

    #[tokio::test]
    async fn test_checkpoints_every_n_pages() {
        let source = ScriptedSource::new(full_page);
        let mut walker = walker(
            source,
            WalkConfig {
                page_cap: Some(5),
                partial_save_every: 2,
                ..config()
            },
        );
        let events = drain(&mut walker).await;

        let checkpoints: Vec<(u32, usize)> = events
            .iter()
            .filter_map(|e| match e {
                WalkEvent::Checkpoint {
                    last_completed_page,
                    items,
                } => Some((*last_completed_page, items.len())),
                _ => None,
            })
            .collect();
        assert_eq!(checkpoints, vec![(2, 4), (4, 8)]);
    }

    #[tokio::test]
    async fn test_restart_begins_at_start_page() {
        let source = ScriptedSource::new(full_page);
        let mut walker = walker(source.clone(), WalkConfig { page_cap: Some(2), ..config() });
        drain(&mut walker).await;
        walker.restart();
        assert!(walker.items().is_empty());
        drain(&mut walker).await;
        assert_eq!(source.requested(), vec![1, 2, 1, 2]);
    }

    #[tokio::test]
    async fn test_stop_before_fetch_cancels_walk() {
        let control = JobControl::new();
        let source = ScriptedSource::new(full_page);
        let mut walker = PaginationWalker::new(
            source.clone(),
            category(),
            JobKind::Full,
            config(),
            control.token(None),
        );

        assert!(matches!(walker.next().await, Some(WalkEvent::Page { page: 1, .. })));
        control.stop();
        assert!(matches!(
            walker.next().await,
            Some(WalkEvent::Finished(StopReason::Cancelled))
        ));
        assert!(walker.next().await.is_none());
        assert_eq!(source.requested(), vec![1]);
    }

    #[tokio::test]
    async fn test_delay_applies_between_fetches_only() {
        let source = ScriptedSource::new(full_page);
        let mut walker = walker(
            source,
            WalkConfig {
                page_cap: Some(3),
                page_delay: Duration::from_millis(40),
                ..config()
            },
        );
        let started = std::time::Instant::now();
        assert!(matches!(walker.next().await, Some(WalkEvent::Page { page: 1, .. })));
        assert!(started.elapsed() < Duration::from_millis(40));
        drain(&mut walker).await;
        assert!(started.elapsed() >= Duration::from_millis(80));
    }
}
