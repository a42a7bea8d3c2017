//! Configuration module for the harvester
//!
//! Configuration is read from a TOML file whose sections all have defaults,
//! then overlaid with environment variables (see [`env`]), then validated.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Page cap: {:?}", config.crawler.page_cap);
//! ```

pub mod env;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackoffKind, Config, CrawlerConfig, EmbeddingConfig, OutputConfig, RetryConfig,
    ScheduleConfig, ServerConfig, TriggerConfig, UploadConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
