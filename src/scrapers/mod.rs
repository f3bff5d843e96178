//! Marketplace crawling: listing discovery, detail extraction and batched
//! persistence.

pub mod config;
pub mod detail;
pub mod discovery;
pub mod extract;
pub mod persist;
pub mod pipeline;

pub use config::CrawlConfig;
pub use detail::{parse_detail, DetailFetcher, FetchError};
pub use discovery::{extract_candidates, Candidate, DiscoveryEngine, DiscoverySession, Listing};
pub use persist::{BatchPersister, PersistStats};
pub use pipeline::{CrawlPipeline, CrawlStats};
