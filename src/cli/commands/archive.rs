//! Archive command.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use console::style;

use super::helpers::{
    launch_browser, open_store, prepare_save_path, print_archive_summary, stop_on_ctrl_c,
};
use crate::archive::{ArchiveStats, ContentArchiver};
use crate::browser::PageRenderer;
use crate::config::Settings;
use crate::repository::ExtensionStore;

/// Save pages of every stored extension that is not archived yet.
pub async fn cmd_archive(settings: &Settings, save_path: &Path) -> anyhow::Result<()> {
    let save_dir = prepare_save_path(save_path)?;
    let ctx = open_store(settings).await?;
    let store = ctx.extensions();
    let browser = launch_browser(settings).await?;
    let stop = stop_on_ctrl_c();

    let result = archive(&browser, &store, &save_dir, stop).await;
    browser.close().await;

    print_archive_summary(&result?, &save_dir);
    Ok(())
}

/// Run an archive pass with an already acquired renderer.
pub(super) async fn archive<R: PageRenderer, S: ExtensionStore>(
    renderer: &R,
    store: &S,
    save_dir: &Path,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<ArchiveStats> {
    println!(
        "{} Archiving pending extensions into {}",
        style("→").cyan(),
        save_dir.display()
    );

    let stats = ContentArchiver::new(renderer, store, save_dir)
        .with_stop_flag(stop)
        .archive_pending()
        .await?;
    Ok(stats)
}
