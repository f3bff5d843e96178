//! Discovery, detail fetching and persistence wired together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::config::CrawlConfig;
use super::detail::DetailFetcher;
use super::discovery::{Candidate, DiscoveryEngine, DiscoveryStats};
use super::persist::{BatchPersister, PersistStats};
use crate::browser::PageRenderer;
use crate::repository::{DbError, ExtensionStore};

/// Totals for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub discovery: DiscoveryStats,
    /// Detail pages turned into records.
    pub fetched: usize,
    /// Detail pages that failed to render or had no identifier.
    pub fetch_errors: usize,
    pub persist: PersistStats,
    /// Stopped early by the stop flag.
    pub interrupted: bool,
}

impl CrawlStats {
    /// Fetch and persistence failures together.
    pub fn errors(&self) -> usize {
        self.fetch_errors + self.persist.errors
    }
}

/// Runs discovery against the store and persists every new extension.
pub struct CrawlPipeline<'a, R: PageRenderer, S: ExtensionStore + ?Sized> {
    renderer: &'a R,
    store: &'a S,
    config: &'a CrawlConfig,
    stop: Arc<AtomicBool>,
}

impl<'a, R: PageRenderer, S: ExtensionStore + ?Sized> CrawlPipeline<'a, R, S> {
    pub fn new(renderer: &'a R, store: &'a S, config: &'a CrawlConfig) -> Self {
        Self {
            renderer,
            store,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `stop` to interrupt the crawl between fetches.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Crawl every listing once. Only failing to read the known identifiers
    /// is fatal; everything else is counted and skipped.
    pub async fn run(&self) -> Result<CrawlStats, DbError> {
        let known = self.store.existing_identifiers().await?;
        info!("{} extensions already stored", known.len());

        let engine = DiscoveryEngine::new(self.renderer, self.config);
        let fetcher = DetailFetcher::new(self.renderer, self.config);
        let persister = BatchPersister::new(
            self.store,
            self.config.batch_size,
            self.config.batch_delay(),
            self.config.refresh_policy,
        );

        let mut stats = CrawlStats::default();
        let mut session = engine.session(known).with_stop_flag(self.stop.clone());

        while !self.stopped() {
            let Some(candidates) = session.next_batch().await else {
                break;
            };
            info!("Found {} new extensions", candidates.len());

            for chunk in candidates.chunks(self.config.batch_size.max(1)) {
                if self.stopped() {
                    break;
                }
                self.fetch_and_persist(chunk, &fetcher, &persister, &mut stats)
                    .await;
            }

            info!(
                "Progress: {} found, {} saved, {} errors",
                session.seen().len(),
                stats.persist.saved,
                stats.errors()
            );
        }

        stats.interrupted = self.stopped();
        stats.discovery = session.stats();
        session.close().await;

        Ok(stats)
    }

    async fn fetch_and_persist(
        &self,
        chunk: &[Candidate],
        fetcher: &DetailFetcher<'_, R>,
        persister: &BatchPersister<'_, S>,
        stats: &mut CrawlStats,
    ) {
        let mut records = Vec::with_capacity(chunk.len());
        for candidate in chunk {
            match fetcher.fetch(&candidate.url).await {
                Ok(record) => {
                    stats.fetched += 1;
                    records.push(record);
                }
                Err(e) => {
                    stats.fetch_errors += 1;
                    warn!("Failed to fetch {}: {}", candidate.url, e);
                }
            }
        }

        if !records.is_empty() {
            stats.persist.merge(persister.persist(&records).await);
        }
    }
}
