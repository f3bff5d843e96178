//! The page renderer seam.
//!
//! Scrapers only ever talk to a browser through these traits. The headless
//! Chrome session implements them for real runs and tests substitute a
//! fixture-backed renderer.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while rendering a page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// Request types that can be aborted before they hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Media,
}

impl ResourceKind {
    /// Blocked while scrolling listing pages.
    pub const LISTING: &'static [ResourceKind] = &[
        ResourceKind::Image,
        ResourceKind::Stylesheet,
        ResourceKind::Font,
        ResourceKind::Media,
    ];

    /// Blocked while reading detail pages.
    pub const DETAIL: &'static [ResourceKind] = &[
        ResourceKind::Image,
        ResourceKind::Stylesheet,
        ResourceKind::Font,
    ];

    /// Archived pages load everything.
    pub const NONE: &'static [ResourceKind] = &[];
}

/// An open, navigated page.
#[async_trait]
pub trait RenderedPage: Send {
    /// Wait until `selector` matches an element.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration)
        -> Result<(), RenderError>;

    /// Evaluate a script expression and return its JSON value
    /// (`Null` for `undefined`).
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, RenderError>;

    /// Full serialized markup of the current document.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// URL of the document after redirects.
    async fn current_url(&mut self) -> Result<Option<String>, RenderError>;

    /// Release the page. Further calls on it fail.
    async fn close(&mut self) -> Result<(), RenderError>;
}

/// Something that can open pages.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    type Page: RenderedPage;

    /// Open a page, abort requests of the `blocked` kinds, and navigate to `url`.
    async fn open_page(&self, url: &str, blocked: &[ResourceKind])
        -> Result<Self::Page, RenderError>;
}
