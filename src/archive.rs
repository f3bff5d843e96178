//! Saving rendered extension pages to disk.
//!
//! Each archived extension gets `<save_dir>/<folder>/content.html` and a
//! `<folder>.url` internet shortcut next to it. The store is only updated once
//! both files are on disk, so an interrupted archive is simply retried on the
//! next run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::browser::{PageRenderer, RenderError, RenderedPage, ResourceKind};
use crate::models::Extension;
use crate::repository::{DbError, ExtensionStore};

/// Longest folder name produced by [`sanitize_folder_name`], in characters.
pub const MAX_FOLDER_NAME_CHARS: usize = 100;

/// Name of the saved page inside each folder.
pub const CONTENT_FILE: &str = "content.html";

/// Errors archiving a single extension.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{0} has no URL")]
    MissingUrl(String),

    #[error("{0} is already archived")]
    AlreadyArchived(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// Counters for one archive pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub archived: usize,
    pub failed: usize,
    /// Stopped early by the stop flag.
    pub interrupted: bool,
}

/// Stems Windows reserves for devices, compared case-insensitively.
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn trim_trailing_dots(name: &str) -> &str {
    name.trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Append `_` to a reserved device stem: `CON` -> `CON_`, `nul.txt` -> `nul_.txt`.
fn escape_device_name(name: &str) -> String {
    let (stem, rest) = name.split_at(name.find('.').unwrap_or(name.len()));
    if RESERVED_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem.trim_end()))
    {
        format!("{}_{}", stem, rest)
    } else {
        name.to_string()
    }
}

/// Make a display name safe to use as a single directory name.
///
/// `/` becomes a space, characters reserved on common filesystems and control
/// characters become `_`, and reserved device names get a `_` suffix. The
/// result never ends in a dot or whitespace. Falls back to `fallback` (then
/// `"extension"`) when nothing usable is left.
pub fn sanitize_folder_name(name: &str, fallback: &str) -> String {
    fn clean(name: &str) -> String {
        let mapped: String = name
            .chars()
            .map(|c| match c {
                '/' => ' ',
                '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let escaped = escape_device_name(trim_trailing_dots(mapped.trim()));
        let capped: String = escaped.chars().take(MAX_FOLDER_NAME_CHARS).collect();
        trim_trailing_dots(&capped).to_string()
    }

    [name, fallback]
        .into_iter()
        .map(clean)
        .find(|s| !s.is_empty() && s != "." && s != "..")
        .unwrap_or_else(|| "extension".to_string())
}

/// `<name> (<identifier>)`, shortening `name` to stay within the length cap.
fn disambiguated_folder_name(name: &str, identifier: &str) -> String {
    let suffix = format!(" ({})", sanitize_folder_name(identifier, "extension"));
    let room = MAX_FOLDER_NAME_CHARS.saturating_sub(suffix.chars().count());
    let base: String = name.chars().take(room).collect();
    format!("{}{}", trim_trailing_dots(&base), suffix)
}

fn shortcut_path(folder: &Path) -> PathBuf {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    folder.join(format!("{}.url", name))
}

/// Contents of a Windows-style internet shortcut pointing at `url`.
pub fn shortcut_contents(url: &str) -> String {
    format!("[InternetShortcut]\nURL={}\n", url)
}

async fn write_durably(path: &Path, contents: &[u8]) -> Result<(), ArchiveError> {
    let io_err = |source: std::io::Error| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    file.write_all(contents).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(())
}

/// Renders pending extensions and writes them under a save directory.
pub struct ContentArchiver<'a, R: PageRenderer, S: ExtensionStore + ?Sized> {
    renderer: &'a R,
    store: &'a S,
    save_dir: PathBuf,
    stop: Arc<AtomicBool>,
}

impl<'a, R: PageRenderer, S: ExtensionStore + ?Sized> ContentArchiver<'a, R, S> {
    pub fn new(renderer: &'a R, store: &'a S, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            store,
            save_dir: save_dir.into(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `stop` to interrupt the pass between extensions.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Directory an extension is archived into: its sanitized name, or
    /// `<name> (<identifier>)` when that folder's shortcut points at another URL.
    async fn folder_for(&self, extension: &Extension, url: &str) -> PathBuf {
        let name = sanitize_folder_name(extension.record.display_name(), extension.identifier());
        let folder = self.save_dir.join(&name);

        match tokio::fs::read_to_string(shortcut_path(&folder)).await {
            Ok(existing) if existing != shortcut_contents(url) => {
                let unique = disambiguated_folder_name(&name, extension.identifier());
                debug!(
                    "{} is taken by another extension, using {}",
                    folder.display(),
                    unique
                );
                self.save_dir.join(unique)
            }
            _ => folder,
        }
    }

    /// Archive every pending extension. Failures are logged and counted; only
    /// failing to list pending extensions is fatal.
    pub async fn archive_pending(&self) -> Result<ArchiveStats, DbError> {
        let pending = self.store.pending_archive().await?;
        info!("{} extensions waiting to be archived", pending.len());

        let mut stats = ArchiveStats::default();
        for (index, extension) in pending.iter().enumerate() {
            if self.stop.load(Ordering::Relaxed) {
                stats.interrupted = true;
                break;
            }

            match self.archive(extension).await {
                Ok(folder) => {
                    stats.archived += 1;
                    info!(
                        "[{}/{}] Archived {} to {}",
                        index + 1,
                        pending.len(),
                        extension.identifier(),
                        folder.display()
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!("Failed to archive {}: {}", extension.identifier(), e);
                }
            }
        }

        Ok(stats)
    }

    /// Archive one extension and return its folder.
    ///
    /// The folder and both files are written before the record is marked as
    /// archived.
    pub async fn archive(&self, extension: &Extension) -> Result<PathBuf, ArchiveError> {
        if extension.is_archived() {
            return Err(ArchiveError::AlreadyArchived(extension.identifier().to_string()));
        }
        let url = extension
            .url()
            .ok_or_else(|| ArchiveError::MissingUrl(extension.identifier().to_string()))?;

        let html = self.render(url).await?;

        let folder = self.folder_for(extension, url).await;
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|source| ArchiveError::Io {
                path: folder.clone(),
                source,
            })?;

        write_durably(&folder.join(CONTENT_FILE), html.as_bytes()).await?;

        write_durably(&shortcut_path(&folder), shortcut_contents(url).as_bytes()).await?;

        let local_path = folder.to_string_lossy();
        if !self
            .store
            .mark_archived(extension.identifier(), &local_path)
            .await?
        {
            debug!(
                "{} was archived concurrently, leaving record as is",
                extension.identifier()
            );
        }

        Ok(folder)
    }

    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let mut page = self.renderer.open_page(url, ResourceKind::NONE).await?;
        let html = page.content().await;
        if let Err(e) = page.close().await {
            debug!("Failed to close page {}: {}", url, e);
        }
        html
    }
}
