//! Listing discovery.
//!
//! Walks every category and sort order, scrolling each listing to reveal
//! lazily loaded results, and hands out candidates that are neither stored
//! already nor seen earlier in the run.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::config::CrawlConfig;
use super::extract::identifier_from_url;
use crate::browser::{PageRenderer, RenderError, RenderedPage, ResourceKind};

/// Result container that must render before a listing is read.
pub const LISTING_READY_SELECTOR: &str = ".item-list-container";

const CANDIDATE_LINKS: &str = ".item-grid-container a[href*=\"/items?itemName=\"], \
     .item-list-container a[href*=\"/items?itemName=\"], \
     .gallery-item-card-container a[href*=\"/items?itemName=\"]";

/// Scrolls by one viewport (at least 500px); evaluates to whether the page moved.
const SCROLL_SCRIPT: &str = "(() => { \
    const before = window.scrollY; \
    window.scrollBy(0, Math.max(500, window.innerHeight)); \
    return window.scrollY !== before; \
})()";

const SCROLL_BURSTS: u32 = 5;
const SCROLL_BURST_PAUSE: Duration = Duration::from_millis(100);

/// An extension detail page found on a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub url: String,
    pub identifier: String,
}

/// One category and sort order combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub category: String,
    pub sort_order: String,
    pub url: String,
}

/// Counters for a discovery session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub listings_visited: usize,
    pub listings_failed: usize,
    pub scroll_steps: usize,
    pub candidates: usize,
}

/// Extract every item link from listing markup, in page order and without
/// duplicates. Relative links are resolved against `page_url`.
pub fn extract_candidates(html: &str, page_url: &str) -> Vec<Candidate> {
    let Ok(selector) = Selector::parse(CANDIDATE_LINKS) else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();
    let doc = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for link in doc.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let url = match base.as_ref().map(|b| b.join(href)) {
            Some(Ok(resolved)) => resolved.to_string(),
            _ => href.to_string(),
        };
        let Some(identifier) = identifier_from_url(&url) else {
            continue;
        };
        if seen.insert(identifier.clone()) {
            candidates.push(Candidate { url, identifier });
        }
    }
    candidates
}

/// Produces discovery sessions over the configured listings.
pub struct DiscoveryEngine<'a, R: PageRenderer> {
    renderer: &'a R,
    config: &'a CrawlConfig,
}

impl<'a, R: PageRenderer> DiscoveryEngine<'a, R> {
    pub fn new(renderer: &'a R, config: &'a CrawlConfig) -> Self {
        Self { renderer, config }
    }

    /// Every listing in crawl order, category-major.
    pub fn listings(&self) -> Vec<Listing> {
        self.config
            .categories
            .iter()
            .flat_map(|category| {
                self.config.sort_orders.iter().map(move |sort_order| Listing {
                    category: category.clone(),
                    sort_order: sort_order.clone(),
                    url: self.config.listing_url(category, sort_order),
                })
            })
            .collect()
    }

    /// Start a session. Candidates whose identifier is in `known` are never
    /// emitted.
    pub fn session(&self, known: HashSet<String>) -> DiscoverySession<'a, R> {
        DiscoverySession {
            renderer: self.renderer,
            config: self.config,
            listings: self.listings().into(),
            current: None,
            known,
            seen: HashSet::new(),
            stats: DiscoveryStats::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct ListingCursor<P> {
    listing: Listing,
    page: P,
    steps: u32,
    stalls: u32,
}

/// A single pass over all listings. Pull candidates with
/// [`DiscoverySession::next_batch`] and release it with
/// [`DiscoverySession::close`].
pub struct DiscoverySession<'a, R: PageRenderer> {
    renderer: &'a R,
    config: &'a CrawlConfig,
    listings: VecDeque<Listing>,
    current: Option<ListingCursor<R::Page>>,
    known: HashSet<String>,
    seen: HashSet<String>,
    stats: DiscoveryStats,
    stop: Arc<AtomicBool>,
}

impl<R: PageRenderer> DiscoverySession<'_, R> {
    /// Use `stop` to end the session before the next listing or scroll step.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    /// Identifiers emitted so far.
    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    /// The next non-empty group of new candidates, or `None` once every
    /// listing is exhausted or the stop flag is set.
    pub async fn next_batch(&mut self) -> Option<Vec<Candidate>> {
        loop {
            if self.stopped() {
                return None;
            }

            let mut cursor = match self.current.take() {
                Some(cursor) => cursor,
                None => {
                    let listing = self.listings.pop_front()?;
                    match self.open_listing(listing).await {
                        Some(cursor) => cursor,
                        None => continue,
                    }
                }
            };

            let fresh = match self.step(&mut cursor).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(
                        "Listing {} / {} stopped: {}",
                        cursor.listing.category, cursor.listing.sort_order, e
                    );
                    Self::close_listing(cursor).await;
                    continue;
                }
            };

            if self.listing_finished(&cursor) {
                info!(
                    "Finished listing {} / {} after {} steps",
                    cursor.listing.category, cursor.listing.sort_order, cursor.steps
                );
                Self::close_listing(cursor).await;
            } else if self.stopped() {
                self.current = Some(cursor);
            } else if let Err(e) = self.scroll(&mut cursor.page).await {
                warn!(
                    "Scrolling {} / {} failed: {}",
                    cursor.listing.category, cursor.listing.sort_order, e
                );
                Self::close_listing(cursor).await;
            } else {
                self.current = Some(cursor);
            }

            if !fresh.is_empty() {
                return Some(fresh);
            }
        }
    }

    /// Close whatever listing page is still open.
    pub async fn close(mut self) {
        if let Some(cursor) = self.current.take() {
            Self::close_listing(cursor).await;
        }
    }

    async fn open_listing(&mut self, listing: Listing) -> Option<ListingCursor<R::Page>> {
        info!(
            "Scanning listing {} / {}",
            listing.category, listing.sort_order
        );
        self.stats.listings_visited += 1;

        let mut page = match self
            .renderer
            .open_page(&listing.url, ResourceKind::LISTING)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!("Skipping listing {}: {}", listing.url, e);
                self.stats.listings_failed += 1;
                return None;
            }
        };

        if let Err(e) = page
            .wait_for_selector(LISTING_READY_SELECTOR, self.config.listing_timeout())
            .await
        {
            warn!("Skipping listing {}: {}", listing.url, e);
            self.stats.listings_failed += 1;
            let _ = page.close().await;
            return None;
        }

        Some(ListingCursor {
            listing,
            page,
            steps: 0,
            stalls: 0,
        })
    }

    /// Read the rendered listing once and keep the candidates not seen before.
    async fn step(
        &mut self,
        cursor: &mut ListingCursor<R::Page>,
    ) -> Result<Vec<Candidate>, RenderError> {
        let html = cursor.page.content().await?;
        let page_url = cursor
            .page
            .current_url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| cursor.listing.url.clone());

        let fresh: Vec<Candidate> = extract_candidates(&html, &page_url)
            .into_iter()
            .filter(|c| !self.known.contains(&c.identifier))
            .filter(|c| self.seen.insert(c.identifier.clone()))
            .collect();

        cursor.steps += 1;
        self.stats.scroll_steps += 1;
        if fresh.is_empty() {
            cursor.stalls += 1;
            debug!(
                "No new candidates ({}/{})",
                cursor.stalls, self.config.stall_limit
            );
        } else {
            cursor.stalls = 0;
            self.stats.candidates += fresh.len();
        }

        Ok(fresh)
    }

    fn listing_finished(&self, cursor: &ListingCursor<R::Page>) -> bool {
        cursor.stalls >= self.config.stall_limit || cursor.steps >= self.config.max_scrolls
    }

    async fn scroll(&self, page: &mut R::Page) -> Result<(), RenderError> {
        for _ in 0..SCROLL_BURSTS {
            let moved = page.evaluate(SCROLL_SCRIPT).await?;
            if !moved.as_bool().unwrap_or(false) {
                break;
            }
            tokio::time::sleep(SCROLL_BURST_PAUSE).await;
        }
        tokio::time::sleep(self.config.scroll_settle()).await;
        Ok(())
    }

    async fn close_listing(mut cursor: ListingCursor<R::Page>) {
        if let Err(e) = cursor.page.close().await {
            debug!("Failed to close listing page: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_candidates_resolves_and_dedups() {
        let html = r#"
            <div class="item-list-container">
              <a href="/items?itemName=ms-python.python">Python</a>
              <a href="/items?itemName=ms-python.python">Python again</a>
              <a href="https://marketplace.visualstudio.com/items?itemName=esbenp.prettier-vscode">Prettier</a>
              <a href="/publishers/microsoft">Publisher</a>
            </div>
            <div class="gallery-item-card-container">
              <a href="/items?itemName=dbaeumer.vscode-eslint">ESLint</a>
            </div>
            <a href="/items?itemName=outside.container">Ignored</a>"#;

        let candidates = extract_candidates(
            html,
            "https://marketplace.visualstudio.com/search?target=VSCode",
        );
        let ids: Vec<&str> = candidates.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ms-python.python",
                "esbenp.prettier-vscode",
                "dbaeumer.vscode-eslint"
            ]
        );
        assert_eq!(
            candidates[0].url,
            "https://marketplace.visualstudio.com/items?itemName=ms-python.python"
        );
    }

    #[test]
    fn test_extract_candidates_empty_listing() {
        assert!(extract_candidates("<div class=\"item-list-container\"></div>", "about:blank")
            .is_empty());
    }
}
