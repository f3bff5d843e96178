//! Run command: discover, then archive, with one browser.

use std::path::Path;
use std::sync::atomic::Ordering;

use super::archive::archive;
use super::discover::crawl;
use super::helpers::{
    launch_browser, open_store, prepare_save_path, print_archive_summary, print_crawl_summary,
    stop_on_ctrl_c,
};
use crate::config::Settings;

/// Crawl all listings, then archive everything still pending.
pub async fn cmd_run(settings: &Settings, save_path: &Path) -> anyhow::Result<()> {
    let save_dir = prepare_save_path(save_path)?;
    let ctx = open_store(settings).await?;
    let store = ctx.extensions();
    let browser = launch_browser(settings).await?;
    let stop = stop_on_ctrl_c();

    let result = async {
        let crawl_stats = crawl(settings, &browser, &store, stop.clone()).await?;
        print_crawl_summary(&crawl_stats);

        if stop.load(Ordering::Relaxed) {
            return Ok(None);
        }
        archive(&browser, &store, &save_dir, stop).await.map(Some)
    }
    .await;
    browser.close().await;

    if let Some(stats) = result? {
        print_archive_summary(&stats, &save_dir);
    }
    Ok(())
}
