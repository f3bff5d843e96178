//! Crawl configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::RefreshPolicy;

/// Marketplace categories crawled by default, in crawl order.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "All categories",
    "Programming Languages",
    "Snippets",
    "Linters",
    "Formatters",
    "Themes",
    "Debuggers",
    "Other",
    "Keymaps",
    "SCM Providers",
    "Extension Packs",
    "Language Packs",
    "Data Science",
    "Machine Learning",
    "Visualization",
    "Testing",
    "Education",
    "Azure",
];

/// Listing sort orders crawled for every category.
pub const DEFAULT_SORT_ORDERS: &[&str] = &[
    "Installs",
    "Rating",
    "PublisherCount",
    "UpdatedDate",
    "ReleaseDate",
    "Name",
];

/// Settings for discovery, detail fetching and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Marketplace root URL.
    pub base_url: String,
    /// Category names (unencoded).
    pub categories: Vec<String>,
    pub sort_orders: Vec<String>,
    /// `pageSize` query value of listing URLs.
    pub page_size: u32,
    /// Extraction steps per listing before giving up on it.
    pub max_scrolls: u32,
    /// Consecutive steps without new candidates that end a listing.
    pub stall_limit: u32,
    /// Records per persistence transaction.
    pub batch_size: usize,
    /// Pause after every persisted batch, in milliseconds.
    pub batch_delay_ms: u64,
    /// Wait for lazily loaded results after each scroll, in milliseconds.
    pub scroll_settle_ms: u64,
    /// How long to wait for a listing's result container, in seconds.
    pub listing_timeout_secs: u64,
    /// Attempts per detail page. 1 disables retrying.
    pub fetch_attempts: u32,
    /// Pause between detail page attempts, in milliseconds.
    pub retry_delay_ms: u64,
    pub refresh_policy: RefreshPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://marketplace.visualstudio.com".to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            sort_orders: DEFAULT_SORT_ORDERS.iter().map(|s| s.to_string()).collect(),
            page_size: 100,
            max_scrolls: 100,
            stall_limit: 3,
            batch_size: 5,
            batch_delay_ms: 500,
            scroll_settle_ms: 2000,
            listing_timeout_secs: 80,
            fetch_attempts: 1,
            retry_delay_ms: 2000,
            refresh_policy: RefreshPolicy::Keep,
        }
    }
}

impl CrawlConfig {
    /// Search URL for one category and sort order.
    pub fn listing_url(&self, category: &str, sort_order: &str) -> String {
        format!(
            "{}/search?target=VSCode&category={}&sortBy={}&pageSize={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(category),
            urlencoding::encode(sort_order),
            self.page_size
        )
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
