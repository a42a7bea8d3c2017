use serde::{Deserialize, Deserializer};

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub schedule: ScheduleConfig,
    pub embedding: EmbeddingConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
}

/// Pagination walk configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// First page fetched in every category walk
    pub start_page: u32,

    /// Hard ceiling on the page number (unbounded when absent)
    pub end_page: Option<u32>,

    /// Maximum number of pages fetched per category in one run
    pub page_cap: Option<u32>,

    /// Delay inserted before every page request except the first (seconds)
    pub page_delay_secs: f64,

    /// Consecutive empty pages that end a walk early (0 disables)
    pub empty_page_stop: u32,

    /// Emit a checkpoint every N pages (0 disables)
    pub partial_save_every: u32,

    /// Items per catalog page, when the catalog should be told explicitly
    pub page_size: Option<u32>,

    /// Timeout for each individual page request (seconds)
    pub request_timeout_secs: u64,

    /// Catalog origin, e.g. `https://emart.ssg.com`
    pub base_url: String,

    /// Download product images after each category of a full run
    pub download_images: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            start_page: 1,
            end_page: None,
            page_cap: Some(500),
            page_delay_secs: 2.0,
            empty_page_stop: 2,
            partial_save_every: 0,
            page_size: None,
            request_timeout_secs: 15,
            base_url: "https://emart.ssg.com".to_string(),
            download_images: false,
        }
    }
}

/// Backoff shape between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Page fetch retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total attempts per page, including the first
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffKind::Exponential,
            initial_backoff_ms: 600,
            max_backoff_ms: 30_000,
        }
    }
}

/// Request identification headers
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// User-Agent header value
    pub value: String,

    /// Accept-Language header value
    pub accept_language: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory for JSON artifacts and images
    pub directory: String,

    /// Path to the SQLite run history database
    pub database_path: String,

    /// Path to the category map (`{"name": "category id"}`)
    pub categories_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
            database_path: "harvester.db".to_string(),
            categories_path: "categories.json".to_string(),
        }
    }
}

/// Hour and minute fields of one recurring trigger, cron style
///
/// `hour` accepts a number, `*`/empty (every hour) or a list such as `1-2,5-23`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    #[serde(deserialize_with = "hour_field")]
    pub hour: String,
    pub minute: u32,
}

/// Accepts `hour = 3` as well as `hour = "1-2,5-23"`
fn hour_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

impl TriggerConfig {
    pub fn new(hour: &str, minute: u32) -> Self {
        Self {
            hour: hour.to_string(),
            minute,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::new("*", 0)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Whether triggers fire at startup
    pub enabled: bool,

    /// Offset of the scheduling wall clock from UTC, in hours
    pub utc_offset_hours: i32,

    /// Interval between trigger evaluations (seconds)
    pub tick_secs: u64,

    pub full: Option<TriggerConfig>,
    pub price: Option<TriggerConfig>,
    pub non_price: Option<TriggerConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_hours: 9,
            tick_secs: 5,
            full: Some(TriggerConfig::new("3", 30)),
            price: Some(TriggerConfig::new("1-2,5-23", 30)),
            non_price: Some(TriggerConfig::new("4", 30)),
        }
    }
}

/// Indexing signal configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EmbeddingConfig {
    /// Indexing service origin; no signal is sent when absent
    pub server: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub verify_ssl: bool,
    pub timeout_secs: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            server: None,
            endpoint: "/".to_string(),
            method: "GET".to_string(),
            verify_ssl: true,
            timeout_secs: 10.0,
        }
    }
}

/// Post-crawl upload configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UploadConfig {
    /// Also upload the partial output of stopped runs
    pub on_partial: bool,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            on_partial: false,
            max_attempts: 3,
            retry_delay_secs: 30,
        }
    }
}

/// Operator transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Origins allowed to call the operator endpoints
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_allow_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}
