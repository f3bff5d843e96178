//! Batched persistence of fetched records.

use std::time::Duration;

use tracing::{info, warn};

use crate::models::ExtensionRecord;
use crate::repository::{ExtensionStore, RefreshPolicy};

/// Counters for persisted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Records in committed batches.
    pub saved: usize,
    /// New rows.
    pub created: usize,
    /// Known rows whose metadata was replaced.
    pub refreshed: usize,
    /// Known rows left untouched.
    pub skipped: usize,
    /// Records in batches whose transaction failed.
    pub errors: usize,
    /// Transactions attempted.
    pub batches: usize,
}

impl PersistStats {
    pub fn merge(&mut self, other: PersistStats) {
        self.saved += other.saved;
        self.created += other.created;
        self.refreshed += other.refreshed;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.batches += other.batches;
    }
}

/// Writes records in small transactional batches.
///
/// A failed transaction only loses its own batch; the remaining batches are
/// still attempted.
pub struct BatchPersister<'a, S: ExtensionStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    delay: Duration,
    policy: RefreshPolicy,
}

impl<'a, S: ExtensionStore + ?Sized> BatchPersister<'a, S> {
    pub fn new(store: &'a S, batch_size: usize, delay: Duration, policy: RefreshPolicy) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            delay,
            policy,
        }
    }

    /// Persist `records`, pausing after every batch.
    pub async fn persist(&self, records: &[ExtensionRecord]) -> PersistStats {
        let mut stats = PersistStats::default();

        for batch in records.chunks(self.batch_size) {
            stats.batches += 1;
            match self.store.save_batch(batch, self.policy).await {
                Ok(outcome) => {
                    stats.saved += outcome.total();
                    stats.created += outcome.created;
                    stats.refreshed += outcome.refreshed;
                    stats.skipped += outcome.skipped;
                    info!(
                        "Saved batch of {} ({} new, {} refreshed, {} unchanged)",
                        batch.len(),
                        outcome.created,
                        outcome.refreshed,
                        outcome.skipped
                    );
                }
                Err(e) => {
                    stats.errors += batch.len();
                    let ids: Vec<&str> = batch.iter().map(|r| r.identifier.as_str()).collect();
                    warn!("Batch save failed for {:?}: {}", ids, e);
                }
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{DbContext, ExtensionRepository};
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("persist.db").display());
        (DbContext::open(&url).await.unwrap(), dir)
    }

    fn records(n: usize) -> Vec<ExtensionRecord> {
        (0..n)
            .map(|i| ExtensionRecord::new(format!("pub.ext{:02}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        let (ctx, _dir) = setup().await;
        {
            let mut conn = ctx.pool().get().await;
            conn.batch_execute(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON extensions
                 WHEN NEW.identifier = 'pub.ext07'
                 BEGIN SELECT RAISE(ABORT, 'poisoned record'); END;",
            )
            .await
            .unwrap();
        }

        let repo: ExtensionRepository = ctx.extensions();
        let persister = BatchPersister::new(&repo, 5, Duration::ZERO, RefreshPolicy::Keep);
        let stats = persister.persist(&records(12)).await;

        assert_eq!(stats.batches, 3);
        assert_eq!(stats.saved, 7);
        assert_eq!(stats.created, 7);
        assert_eq!(stats.errors, 5);

        let stored = repo.existing_identifiers().await.unwrap();
        for i in 0..12 {
            let id = format!("pub.ext{:02}", i);
            let in_failed_batch = (5..10).contains(&i);
            assert_eq!(stored.contains(&id), !in_failed_batch, "{}", id);
        }
    }

    #[tokio::test]
    async fn test_known_records_are_skipped() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.extensions();
        let persister = BatchPersister::new(&repo, 5, Duration::ZERO, RefreshPolicy::Keep);

        let first = persister.persist(&records(3)).await;
        let second = persister.persist(&records(4)).await;

        assert_eq!(first.created, 3);
        assert_eq!(second.created, 1);
        assert_eq!(second.skipped, 3);
        assert_eq!(repo.existing_identifiers().await.unwrap().len(), 4);
    }
}
