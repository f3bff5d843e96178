//! The record store seam.
//!
//! Everything that reads or writes extension records goes through
//! [`ExtensionStore`], so the crawler and archiver can run against the
//! SQLite repository or an in-memory double.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pool::DbError;
use crate::models::{Extension, ExtensionRecord};

/// What to do when a scraped identifier already exists in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Leave the stored record untouched.
    #[default]
    Keep,
    /// Replace stored metadata with the freshly scraped values.
    /// Archive state is never changed.
    Overwrite,
}

/// Result of saving one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Refreshed,
    Skipped,
}

/// Per-batch tally of [`SaveOutcome`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: usize,
    pub refreshed: usize,
    pub skipped: usize,
}

impl BatchOutcome {
    pub fn record(&mut self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Created => self.created += 1,
            SaveOutcome::Refreshed => self.refreshed += 1,
            SaveOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.refreshed + self.skipped
    }
}

/// Record counts for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionCounts {
    pub total: u64,
    pub archived: u64,
    pub pending: u64,
}

/// Persistent store of extension records keyed by identifier.
#[async_trait]
pub trait ExtensionStore: Send + Sync {
    /// Look up one record.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Extension>, DbError>;

    /// Insert a record unless its identifier is already stored.
    /// New rows always start out not archived. Returns whether a row was created.
    async fn insert_if_absent(&self, record: &ExtensionRecord) -> Result<bool, DbError>;

    /// Replace the metadata of a stored record. Returns false if it is unknown.
    async fn update_metadata(&self, record: &ExtensionRecord) -> Result<bool, DbError>;

    /// Every identifier currently stored.
    async fn existing_identifiers(&self) -> Result<HashSet<String>, DbError>;

    /// Save all records in one transaction. Either every record is applied or
    /// none are.
    async fn save_batch(
        &self,
        records: &[ExtensionRecord],
        policy: RefreshPolicy,
    ) -> Result<BatchOutcome, DbError>;

    /// Records that have a URL but no archived content yet, oldest first.
    async fn pending_archive(&self) -> Result<Vec<Extension>, DbError>;

    /// Set `local_path` and flip the archived flag. Only applies to records
    /// that are not archived yet; returns whether a row changed.
    async fn mark_archived(&self, identifier: &str, local_path: &str) -> Result<bool, DbError>;

    /// Totals for status output.
    async fn counts(&self) -> Result<ExtensionCounts, DbError>;
}
