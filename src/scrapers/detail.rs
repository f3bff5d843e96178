//! Extension detail pages.

use scraper::Html;
use thiserror::Error;
use tracing::{debug, warn};

use super::config::CrawlConfig;
use super::extract::{
    all_texts, first_text, identifier_from_url, parse_count, parse_date, parse_rating,
};
use crate::browser::{PageRenderer, RenderError, RenderedPage, ResourceKind};
use crate::models::ExtensionRecord;

/// Selector chains for single-valued fields. First non-empty match wins.
const NAME: &[&str] = &["h1[itemprop=\"name\"]", ".ux-item-name"];
const DESCRIPTION: &[&str] = &[".ux-item-shortdesc", ".ux-item-description"];
const VERSION: &[&str] = &[".ux-item-meta-version", "#version + td"];
const AUTHOR: &[&str] = &[".ux-item-publisher", "#publisher + td"];
const DOWNLOADS: &[&str] = &[".ux-item-meta-installs", ".installs"];
const INSTALLS: &[&str] = &[".installs-text", ".installs"];
const LAST_UPDATED: &[&str] = &[".extension-last-updated-date", "#last-updated + td"];
const RATING: &[&str] = &[".ux-item-rating-count", ".rating"];
const REVIEW_COUNT: &[&str] = &[".ux-item-rating-count span"];
const REPOSITORY: &[&str] = &[".ux-repository"];
const LICENSE: &[&str] = &[".ux-section-resources a[href*=\"license\"]"];

/// Multi-valued fields.
const CATEGORIES: &str = ".meta-data-list-link";
const TAGS: &str = ".meta-data-list";

/// Errors from fetching a single detail page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("no extension identifier in {0}")]
    MissingIdentifier(String),
}

/// Extract a record from rendered detail markup.
///
/// The identifier comes from the page URL after redirects, falling back to
/// the URL that was requested. Every other field is optional.
pub fn parse_detail(
    html: &str,
    page_url: Option<&str>,
    requested_url: &str,
) -> Result<ExtensionRecord, FetchError> {
    let identifier = page_url
        .and_then(identifier_from_url)
        .or_else(|| identifier_from_url(requested_url))
        .ok_or_else(|| FetchError::MissingIdentifier(requested_url.to_string()))?;

    let doc = Html::parse_document(html);

    let record = ExtensionRecord {
        identifier,
        name: first_text(&doc, NAME),
        description: first_text(&doc, DESCRIPTION),
        version: first_text(&doc, VERSION),
        author: first_text(&doc, AUTHOR),
        url: Some(requested_url.to_string()),
        downloads: first_text(&doc, DOWNLOADS).as_deref().and_then(parse_count),
        installs: first_text(&doc, INSTALLS).as_deref().and_then(parse_count),
        last_updated: first_text(&doc, LAST_UPDATED).as_deref().and_then(parse_date),
        categories: all_texts(&doc, CATEGORIES),
        rating: first_text(&doc, RATING).as_deref().and_then(parse_rating),
        review_count: first_text(&doc, REVIEW_COUNT),
        tags: all_texts(&doc, TAGS),
        repository: first_text(&doc, REPOSITORY),
        license: first_text(&doc, LICENSE),
    };

    debug!("Parsed {} ({:?})", record.identifier, record.name);
    Ok(record)
}

/// Renders detail pages and turns them into records.
pub struct DetailFetcher<'a, R: PageRenderer> {
    renderer: &'a R,
    config: &'a CrawlConfig,
}

impl<'a, R: PageRenderer> DetailFetcher<'a, R> {
    pub fn new(renderer: &'a R, config: &'a CrawlConfig) -> Self {
        Self { renderer, config }
    }

    /// Fetch one detail page, retrying render failures up to
    /// `fetch_attempts` times in total.
    pub async fn fetch(&self, url: &str) -> Result<ExtensionRecord, FetchError> {
        let attempts = self.config.fetch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Err(FetchError::Render(e)) if attempt < attempts => {
                    warn!(
                        "Fetching {} failed (attempt {}/{}): {}",
                        url, attempt, attempts, e
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<ExtensionRecord, FetchError> {
        let mut page = self.renderer.open_page(url, ResourceKind::DETAIL).await?;
        let result = read_detail(&mut page, url).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close detail page {}: {}", url, e);
        }
        result
    }
}

async fn read_detail<P: RenderedPage>(
    page: &mut P,
    url: &str,
) -> Result<ExtensionRecord, FetchError> {
    let html = page.content().await?;
    let page_url = page.current_url().await.unwrap_or(None);
    parse_detail(&html, page_url.as_deref(), url)
}
