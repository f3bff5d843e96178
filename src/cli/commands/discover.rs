//! Discover command.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use console::style;

use super::helpers::{launch_browser, open_store, print_crawl_summary, stop_on_ctrl_c};
use crate::browser::PageRenderer;
use crate::config::Settings;
use crate::repository::ExtensionStore;
use crate::scrapers::{CrawlPipeline, CrawlStats};

/// Crawl every listing and store new extensions.
pub async fn cmd_discover(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_store(settings).await?;
    let store = ctx.extensions();
    let browser = launch_browser(settings).await?;
    let stop = stop_on_ctrl_c();

    let result = crawl(settings, &browser, &store, stop).await;
    browser.close().await;

    print_crawl_summary(&result?);
    Ok(())
}

/// Run the crawl pipeline with an already acquired renderer.
pub(super) async fn crawl<R: PageRenderer, S: ExtensionStore>(
    settings: &Settings,
    renderer: &R,
    store: &S,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<CrawlStats> {
    println!(
        "{} Crawling {} categories x {} sort orders",
        style("→").cyan(),
        settings.crawl.categories.len(),
        settings.crawl.sort_orders.len()
    );

    let stats = CrawlPipeline::new(renderer, store, &settings.crawl)
        .with_stop_flag(stop)
        .run()
        .await?;
    Ok(stats)
}
