//! Extension models.
//!
//! `ExtensionRecord` is what the detail fetcher extracts from a marketplace
//! page. `Extension` is a stored row: the same metadata plus the store's
//! bookkeeping and the archive state of the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata scraped from one extension detail page.
///
/// Every field except `identifier` is best-effort and may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Stable marketplace key (`publisher.extension`).
    pub identifier: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    /// Detail page URL.
    pub url: Option<String>,
    pub downloads: Option<u64>,
    pub installs: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub categories: Option<Vec<String>>,
    pub rating: Option<f64>,
    /// Kept as the raw text shown on the page.
    pub review_count: Option<String>,
    pub tags: Option<Vec<String>>,
    pub repository: Option<String>,
    pub license: Option<String>,
}

impl ExtensionRecord {
    /// Create a record that only knows its identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Set the detail page URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Human readable name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }
}

/// Whether an extension's page content has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArchiveState {
    /// Discovered, content not yet saved.
    Pending,
    /// Content saved under `local_path`.
    Archived { local_path: String },
}

impl ArchiveState {
    /// Build from the two stored columns.
    ///
    /// A row flagged as archived without a path is treated as pending so it
    /// gets archived again.
    pub fn from_columns(is_created: bool, local_path: Option<String>) -> Self {
        match (is_created, local_path) {
            (true, Some(local_path)) => Self::Archived { local_path },
            _ => Self::Pending,
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, Self::Archived { .. })
    }

    pub fn local_path(&self) -> Option<&str> {
        match self {
            Self::Pending => None,
            Self::Archived { local_path } => Some(local_path),
        }
    }
}

/// An extension as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    /// Database row ID.
    pub id: i32,
    pub record: ExtensionRecord,
    pub archive: ArchiveState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Extension {
    pub fn identifier(&self) -> &str {
        &self.record.identifier
    }

    pub fn url(&self) -> Option<&str> {
        self.record.url.as_deref()
    }

    pub fn is_archived(&self) -> bool {
        self.archive.is_archived()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_state_requires_path() {
        assert_eq!(ArchiveState::from_columns(true, None), ArchiveState::Pending);
        assert_eq!(
            ArchiveState::from_columns(false, Some("/tmp/x".into())),
            ArchiveState::Pending
        );
        let archived = ArchiveState::from_columns(true, Some("/tmp/x".into()));
        assert!(archived.is_archived());
        assert_eq!(archived.local_path(), Some("/tmp/x"));
    }

    #[test]
    fn test_display_name_falls_back_to_identifier() {
        let mut record = ExtensionRecord::new("ms-python.python");
        assert_eq!(record.display_name(), "ms-python.python");
        record.name = Some("Python".into());
        assert_eq!(record.display_name(), "Python");
    }
}
