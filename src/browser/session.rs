//! Headless Chrome session driven over CDP with chromiumoxide.

#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use std::time::Duration;

use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

use super::config::BrowserEngineConfig;
use super::renderer::{PageRenderer, RenderError, RenderedPage, ResourceKind};

#[cfg(feature = "browser")]
impl ResourceKind {
    fn cdp_type(self) -> ResourceType {
        match self {
            ResourceKind::Image => ResourceType::Image,
            ResourceKind::Stylesheet => ResourceType::Stylesheet,
            ResourceKind::Font => ResourceType::Font,
            ResourceKind::Media => ResourceType::Media,
        }
    }
}

#[cfg(feature = "browser")]
fn protocol(e: impl std::fmt::Display) -> RenderError {
    RenderError::Protocol(e.to_string())
}

/// A running browser. Acquire with [`BrowserSession::launch`] and release with
/// [`BrowserSession::close`] once the command is done with it.
#[cfg(feature = "browser")]
pub struct BrowserSession {
    config: BrowserEngineConfig,
    browser: Browser,
    handler: JoinHandle<()>,
    remote: bool,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    const CHROME_COMMANDS: &'static [&'static str] = &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ];

    fn find_chrome(config: &BrowserEngineConfig) -> Result<PathBuf, RenderError> {
        if let Some(ref path) = config.executable {
            return Ok(path.clone());
        }

        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in Self::CHROME_COMMANDS {
            if let Ok(path) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(RenderError::Unavailable(
            "Chrome/Chromium not found. Install it or set browser.executable".to_string(),
        ))
    }

    /// Launch a local browser, or attach to `remote_url` when configured.
    pub async fn launch(config: BrowserEngineConfig) -> Result<Self, RenderError> {
        if let Some(remote_url) = config.remote_url.clone() {
            return Self::connect_remote(config, &remote_url).await;
        }

        info!("Launching browser (headless={})", config.headless);
        let chrome_path = Self::find_chrome(&config)?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(config.navigation_timeout());

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| RenderError::Unavailable(format!("bad browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Unavailable(format!("failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            config,
            browser,
            handler,
            remote: false,
        })
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(config: BrowserEngineConfig, url: &str) -> Result<Self, RenderError> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, config.navigation_timeout
        );

        // The WebSocket URL comes from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| RenderError::Unavailable(format!("remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| RenderError::Unavailable(format!("remote browser version: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                RenderError::Unavailable("no webSocketDebuggerUrl in response".to_string())
            })?;

        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: config.navigation_timeout(),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| RenderError::Unavailable(format!("remote browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            config,
            browser,
            handler,
            remote: true,
        })
    }

    /// Shut the browser down. A remote browser is only disconnected.
    pub async fn close(mut self) {
        if !self.remote {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
    }

    async fn install_blocking(
        page: &Page,
        blocked: &[ResourceKind],
    ) -> Result<Option<JoinHandle<()>>, RenderError> {
        if blocked.is_empty() {
            return Ok(None);
        }

        let patterns: Vec<RequestPattern> = blocked
            .iter()
            .map(|kind| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(kind.cdp_type())
                    .build()
            })
            .collect();

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(protocol)?;
        page.execute(EnableParams::builder().patterns(patterns).build())
            .await
            .map_err(protocol)?;

        // Only blocked resource types are paused, so every event gets failed.
        let intercept_page = page.clone();
        Ok(Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let params =
                    FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if intercept_page.execute(params).await.is_err() {
                    break;
                }
            }
        })))
    }

    async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<(), RenderError> {
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RenderError::Timeout {
                what: format!("navigation to {}", url),
                timeout,
            }),
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageRenderer for BrowserSession {
    type Page = ChromiumPage;

    async fn open_page(
        &self,
        url: &str,
        blocked: &[ResourceKind],
    ) -> Result<ChromiumPage, RenderError> {
        let page = self.browser.new_page("about:blank").await.map_err(protocol)?;

        let mut opened = ChromiumPage {
            page,
            interceptor: None,
            step_timeout: self.config.step_timeout(),
            closed: false,
        };

        let navigated = async {
            opened.interceptor = Self::install_blocking(&opened.page, blocked).await?;
            Self::navigate(&opened.page, url, self.config.navigation_timeout()).await
        }
        .await;

        match navigated {
            Ok(()) => Ok(opened),
            Err(e) => {
                let _ = opened.close().await;
                Err(e)
            }
        }
    }
}

/// A page opened by [`BrowserSession`].
#[cfg(feature = "browser")]
pub struct ChromiumPage {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
    step_timeout: Duration,
    closed: bool,
}

#[cfg(feature = "browser")]
impl ChromiumPage {
    async fn step<T, F>(&self, what: &str, fut: F) -> Result<T, RenderError>
    where
        F: std::future::Future<Output = Result<T, RenderError>>,
    {
        tokio::time::timeout(self.step_timeout, fut)
            .await
            .map_err(|_| RenderError::Timeout {
                what: what.to_string(),
                timeout: self.step_timeout,
            })?
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl RenderedPage for ChromiumPage {
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RenderError::Timeout {
                    what: format!("selector {}", selector),
                    timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, RenderError> {
        self.step("script", async {
            let result = self
                .page
                .evaluate(script)
                .await
                .map_err(|e| RenderError::Script(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
        })
        .await
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.step("page content", async {
            self.page.content().await.map_err(protocol)
        })
        .await
    }

    async fn current_url(&mut self) -> Result<Option<String>, RenderError> {
        self.page.url().await.map_err(protocol)
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(task) = self.interceptor.take() {
            task.abort();
        }
        self.page.clone().close().await.map_err(protocol)
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession {
    _config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub async fn launch(_config: BrowserEngineConfig) -> Result<Self, RenderError> {
        Err(RenderError::Unavailable(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }

    pub async fn close(self) {}
}

/// Uninhabited without the browser feature.
#[cfg(not(feature = "browser"))]
pub enum ChromiumPage {}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageRenderer for BrowserSession {
    type Page = ChromiumPage;

    async fn open_page(
        &self,
        _url: &str,
        _blocked: &[ResourceKind],
    ) -> Result<ChromiumPage, RenderError> {
        Err(RenderError::Unavailable(
            "Browser support not compiled".to_string(),
        ))
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl RenderedPage for ChromiumPage {
    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: std::time::Duration,
    ) -> Result<(), RenderError> {
        match *self {}
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, RenderError> {
        match *self {}
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        match *self {}
    }

    async fn current_url(&mut self) -> Result<Option<String>, RenderError> {
        match *self {}
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        match *self {}
    }
}
