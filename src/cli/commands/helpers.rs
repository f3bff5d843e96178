//! Shared helper functions for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::archive::ArchiveStats;
use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::repository::DbContext;
use crate::scrapers::CrawlStats;

/// Create directories and open the migrated store.
pub async fn open_store(settings: &Settings) -> anyhow::Result<DbContext> {
    settings
        .ensure_directories()
        .context("Failed to prepare data directory")?;
    DbContext::open(&settings.database_url())
        .await
        .with_context(|| format!("Failed to open database {}", settings.database_url()))
}

/// Launch the configured browser behind a spinner.
pub async fn launch_browser(settings: &Settings) -> anyhow::Result<BrowserSession> {
    let pb = spinner("Starting browser...");
    let browser = BrowserSession::launch(settings.browser.clone()).await;
    pb.finish_and_clear();
    browser.context("Failed to start browser")
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// A flag that flips once Ctrl-C is pressed. A second Ctrl-C exits the
/// process immediately.
pub fn stop_on_ctrl_c() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{} Interrupted, finishing current item (Ctrl-C again to quit)...",
            style("!").yellow()
        );
        flag.store(true, Ordering::Relaxed);

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Aborted", style("!").red());
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
    stop
}

/// Make the save path absolute and create it.
pub fn prepare_save_path(path: &Path) -> anyhow::Result<PathBuf> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let path = PathBuf::from(expanded);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create save directory {}", path.display()))?;
    Ok(path)
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(template);
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_message(message.to_string());
    pb
}

pub fn print_crawl_summary(stats: &CrawlStats) {
    println!(
        "{} Crawl {}",
        style("✓").green(),
        if stats.interrupted {
            "interrupted"
        } else {
            "finished"
        }
    );
    println!(
        "  Listings: {} visited, {} failed",
        stats.discovery.listings_visited, stats.discovery.listings_failed
    );
    println!("  New extensions found: {}", stats.discovery.candidates);
    println!(
        "  Saved: {} ({} new, {} refreshed, {} unchanged)",
        stats.persist.saved, stats.persist.created, stats.persist.refreshed, stats.persist.skipped
    );
    if stats.errors() > 0 {
        println!(
            "  {} {} errors ({} fetch, {} save)",
            style("!").yellow(),
            stats.errors(),
            stats.fetch_errors,
            stats.persist.errors
        );
    }
}

pub fn print_archive_summary(stats: &ArchiveStats, save_dir: &Path) {
    println!(
        "{} Archived {} extensions into {}",
        style("✓").green(),
        stats.archived,
        save_dir.display()
    );
    if stats.failed > 0 {
        println!(
            "  {} {} failed and will be retried next run",
            style("!").yellow(),
            stats.failed
        );
    }
    if stats.interrupted {
        println!("  {} Interrupted before the queue was empty", style("!").yellow());
    }
}
