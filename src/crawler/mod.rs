//! Crawler module for catalog page fetching and pagination
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry and backoff
//! - Listing page parsing and field projection
//! - The per-category pagination walk
//! - Product image download

mod fetcher;
mod images;
mod parser;
mod retry;
mod walker;

pub use fetcher::{build_http_client, HttpPageFetcher, PageRequest, PageResult, PageSource};
pub use images::{ImageDownloader, ImageReport};
pub use parser::{CatalogParser, ItemRecord, ParsedListing};
pub use retry::RetryPolicy;
pub use walker::{PaginationWalker, StopReason, WalkConfig, WalkEvent};
