//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use marketcrawl::browser::{PageRenderer, RenderError, RenderedPage, ResourceKind};
use marketcrawl::models::{ArchiveState, Extension, ExtensionRecord};
use marketcrawl::repository::util::to_diesel_error;
use marketcrawl::repository::{
    BatchOutcome, DbError, ExtensionCounts, ExtensionStore, RefreshPolicy, SaveOutcome,
};
use marketcrawl::scrapers::CrawlConfig;

pub const BASE_URL: &str = "https://market.test";

pub fn item_url(identifier: &str) -> String {
    format!("{}/items?itemName={}", BASE_URL, identifier)
}

/// Listing markup linking to `identifiers`.
pub fn listing_html(identifiers: &[&str]) -> String {
    let links: String = identifiers
        .iter()
        .map(|id| format!(r#"<a href="/items?itemName={id}">{id}</a>"#))
        .collect();
    format!(r#"<html><body><div class="item-list-container">{links}</div></body></html>"#)
}

/// Detail markup for one extension.
pub fn detail_html(name: &str) -> String {
    format!(
        r#"<html><body>
            <h1 itemprop="name">{name}</h1>
            <div class="ux-item-shortdesc">About {name}</div>
            <span class="ux-item-publisher">Publisher</span>
            <span class="ux-item-meta-installs">1,024 installs</span>
            <span class="extension-last-updated-date">not a date</span>
        </body></html>"#
    )
}

/// Crawl settings pointed at the fake site with all waits disabled.
pub fn test_config(categories: &[&str], sort_orders: &[&str]) -> CrawlConfig {
    CrawlConfig {
        base_url: BASE_URL.to_string(),
        categories: categories.iter().map(|s| s.to_string()).collect(),
        sort_orders: sort_orders.iter().map(|s| s.to_string()).collect(),
        batch_delay_ms: 0,
        scroll_settle_ms: 0,
        listing_timeout_secs: 1,
        retry_delay_ms: 0,
        ..CrawlConfig::default()
    }
}

#[derive(Default)]
struct SiteState {
    /// URL -> successive renders; each successful scroll reveals the next.
    pages: HashMap<String, Vec<String>>,
    /// URL -> remaining navigation failures.
    failures: HashMap<String, usize>,
    opened: HashMap<String, usize>,
    blocked: HashMap<String, Vec<ResourceKind>>,
}

/// In-memory renderer serving fixture HTML.
#[derive(Clone, Default)]
pub struct FakeRenderer {
    state: Arc<Mutex<SiteState>>,
    live_pages: Arc<AtomicUsize>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    pub fn page(&self, url: &str, html: String) -> &Self {
        self.scrolling_page(url, vec![html])
    }

    /// Serve a page whose content grows with every scroll pass.
    pub fn scrolling_page(&self, url: &str, states: Vec<String>) -> &Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), states);
        self
    }

    /// Fail the next `times` navigations to `url`.
    pub fn fail(&self, url: &str, times: usize) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(url.to_string(), times);
        self
    }

    /// How many times `url` was opened (including failed navigations).
    pub fn opened(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .opened
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn blocked_for(&self, url: &str) -> Vec<ResourceKind> {
        self.state
            .lock()
            .unwrap()
            .blocked
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    /// Pages opened and not yet closed.
    pub fn live_pages(&self) -> usize {
        self.live_pages.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    type Page = FakePage;

    async fn open_page(&self, url: &str, blocked: &[ResourceKind]) -> Result<FakePage, RenderError> {
        let mut state = self.state.lock().unwrap();
        *state.opened.entry(url.to_string()).or_default() += 1;
        state.blocked.insert(url.to_string(), blocked.to_vec());

        if let Some(remaining) = state.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
        }

        let states = state.pages.get(url).cloned().ok_or_else(|| RenderError::Navigation {
            url: url.to_string(),
            reason: "404".to_string(),
        })?;

        self.live_pages.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage {
            url: url.to_string(),
            states,
            position: 0,
            closed: false,
            live_pages: self.live_pages.clone(),
        })
    }
}

pub struct FakePage {
    url: String,
    states: Vec<String>,
    position: usize,
    closed: bool,
    live_pages: Arc<AtomicUsize>,
}

impl FakePage {
    fn html(&self) -> Result<&str, RenderError> {
        if self.closed {
            return Err(RenderError::Protocol("page closed".to_string()));
        }
        Ok(&self.states[self.position])
    }
}

#[async_trait]
impl RenderedPage for FakePage {
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let class = selector.trim_start_matches('.');
        if self.html()?.contains(class) {
            Ok(())
        } else {
            Err(RenderError::Timeout {
                what: format!("selector {}", selector),
                timeout,
            })
        }
    }

    /// Reveals the next render and reports the viewport as pinned, so one
    /// scroll pass uncovers exactly one more state.
    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, RenderError> {
        self.html()?;
        if self.position + 1 < self.states.len() {
            self.position += 1;
        }
        Ok(serde_json::Value::Bool(false))
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.html().map(str::to_string)
    }

    async fn current_url(&mut self) -> Result<Option<String>, RenderError> {
        Ok(Some(self.url.clone()))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        if !self.closed {
            self.closed = true;
            self.live_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// In-memory [`ExtensionStore`]. Batches are applied to a copy and swapped in,
/// so a failed batch leaves nothing behind.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Extension>>,
    /// Identifiers whose save fails, failing the whole batch.
    poisoned: Mutex<HashSet<String>>,
    fail_mark_archived: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poison(&self, identifier: &str) {
        self.poisoned.lock().unwrap().insert(identifier.to_string());
    }

    pub fn fail_mark_archived(&self) {
        *self.fail_mark_archived.lock().unwrap() = true;
    }

    pub fn all(&self) -> Vec<Extension> {
        self.rows.lock().unwrap().clone()
    }

    fn save_into(
        rows: &mut Vec<Extension>,
        record: &ExtensionRecord,
        policy: RefreshPolicy,
    ) -> SaveOutcome {
        let now = Utc::now();
        match rows.iter_mut().find(|e| e.identifier() == record.identifier) {
            None => {
                rows.push(Extension {
                    id: rows.len() as i32 + 1,
                    record: record.clone(),
                    archive: ArchiveState::Pending,
                    created_at: now,
                    updated_at: now,
                });
                SaveOutcome::Created
            }
            Some(_) if policy == RefreshPolicy::Keep => SaveOutcome::Skipped,
            Some(existing) => {
                existing.record = record.clone();
                existing.updated_at = now;
                SaveOutcome::Refreshed
            }
        }
    }
}

#[async_trait]
impl ExtensionStore for MemoryStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Extension>, DbError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.identifier() == identifier)
            .cloned())
    }

    async fn insert_if_absent(&self, record: &ExtensionRecord) -> Result<bool, DbError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(Self::save_into(&mut rows, record, RefreshPolicy::Keep) == SaveOutcome::Created)
    }

    async fn update_metadata(&self, record: &ExtensionRecord) -> Result<bool, DbError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|e| e.identifier() == record.identifier) {
            Self::save_into(&mut rows, record, RefreshPolicy::Overwrite);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn existing_identifiers(&self) -> Result<HashSet<String>, DbError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.identifier().to_string())
            .collect())
    }

    async fn save_batch(
        &self,
        records: &[ExtensionRecord],
        policy: RefreshPolicy,
    ) -> Result<BatchOutcome, DbError> {
        let poisoned = self.poisoned.lock().unwrap().clone();
        let mut rows = self.rows.lock().unwrap();
        let mut staged = rows.clone();
        let mut outcome = BatchOutcome::default();
        for record in records {
            if poisoned.contains(&record.identifier) {
                return Err(to_diesel_error(format!("poisoned {}", record.identifier)));
            }
            outcome.record(Self::save_into(&mut staged, record, policy));
        }
        *rows = staged;
        Ok(outcome)
    }

    async fn pending_archive(&self) -> Result<Vec<Extension>, DbError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.is_archived() && e.url().is_some())
            .cloned()
            .collect())
    }

    async fn mark_archived(&self, identifier: &str, local_path: &str) -> Result<bool, DbError> {
        if *self.fail_mark_archived.lock().unwrap() {
            return Err(to_diesel_error("disk I/O error"));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|e| e.identifier() == identifier && !e.is_archived())
        {
            Some(row) => {
                row.archive = ArchiveState::Archived {
                    local_path: local_path.to_string(),
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn counts(&self) -> Result<ExtensionCounts, DbError> {
        let rows = self.rows.lock().unwrap();
        let archived = rows.iter().filter(|e| e.is_archived()).count() as u64;
        Ok(ExtensionCounts {
            total: rows.len() as u64,
            archived,
            pending: rows.len() as u64 - archived,
        })
    }
}
