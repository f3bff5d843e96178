//! Diesel-based extension repository for SQLite.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! while maintaining Diesel's compile-time query checking.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::diesel_models::{ExtensionMetadataChangeset, ExtensionRow, NewExtension};
use super::pool::{retry_busy, DbError, SqliteConn, SqlitePool};
use super::store::{
    BatchOutcome, ExtensionCounts, ExtensionStore, RefreshPolicy, SaveOutcome,
};
use super::util::{decode_list, encode_list, parse_datetime, parse_datetime_opt};
use crate::models::{ArchiveState, Extension, ExtensionRecord};
use crate::schema::extensions;

/// Convert a database row to a domain model.
impl From<ExtensionRow> for Extension {
    fn from(row: ExtensionRow) -> Self {
        Extension {
            id: row.id,
            record: ExtensionRecord {
                identifier: row.identifier,
                name: row.name,
                description: row.description,
                version: row.version,
                author: row.author,
                url: row.url,
                downloads: row.downloads.and_then(|n| u64::try_from(n).ok()),
                installs: row.installs.and_then(|n| u64::try_from(n).ok()),
                last_updated: parse_datetime_opt(row.last_updated),
                categories: decode_list(row.categories),
                rating: row.rating,
                review_count: row.review_count,
                tags: decode_list(row.tags),
                repository: row.repository,
                license: row.license,
            },
            archive: ArchiveState::from_columns(row.is_created != 0, row.local_path),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        }
    }
}

fn count_column(n: Option<u64>) -> Option<i64> {
    n.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

fn new_extension<'a>(record: &'a ExtensionRecord, now: &'a str) -> NewExtension<'a> {
    NewExtension {
        identifier: &record.identifier,
        name: record.name.as_deref(),
        description: record.description.as_deref(),
        version: record.version.as_deref(),
        author: record.author.as_deref(),
        url: record.url.as_deref(),
        downloads: count_column(record.downloads),
        installs: count_column(record.installs),
        last_updated: record.last_updated.map(|dt| dt.to_rfc3339()),
        categories: encode_list(record.categories.as_deref()),
        rating: record.rating,
        review_count: record.review_count.as_deref(),
        tags: encode_list(record.tags.as_deref()),
        repository: record.repository.as_deref(),
        license: record.license.as_deref(),
        local_path: None,
        created_at: now,
        updated_at: now,
        is_created: 0,
    }
}

fn metadata_changeset<'a>(
    record: &'a ExtensionRecord,
    now: &'a str,
) -> ExtensionMetadataChangeset<'a> {
    ExtensionMetadataChangeset {
        name: record.name.as_deref(),
        description: record.description.as_deref(),
        version: record.version.as_deref(),
        author: record.author.as_deref(),
        url: record.url.as_deref(),
        downloads: count_column(record.downloads),
        installs: count_column(record.installs),
        last_updated: record.last_updated.map(|dt| dt.to_rfc3339()),
        categories: encode_list(record.categories.as_deref()),
        rating: record.rating,
        review_count: record.review_count.as_deref(),
        tags: encode_list(record.tags.as_deref()),
        repository: record.repository.as_deref(),
        license: record.license.as_deref(),
        updated_at: now,
    }
}

/// Find-or-create one record on an open connection.
async fn save_one(
    conn: &mut SqliteConn,
    record: &ExtensionRecord,
    policy: RefreshPolicy,
    now: &str,
) -> Result<SaveOutcome, DbError> {
    let existing: Option<i32> = extensions::table
        .filter(extensions::identifier.eq(&record.identifier))
        .select(extensions::id)
        .first(conn)
        .await
        .optional()?;

    match (existing, policy) {
        (None, _) => {
            diesel::insert_into(extensions::table)
                .values(new_extension(record, now))
                .execute(conn)
                .await?;
            Ok(SaveOutcome::Created)
        }
        (Some(_), RefreshPolicy::Keep) => Ok(SaveOutcome::Skipped),
        (Some(id), RefreshPolicy::Overwrite) => {
            diesel::update(extensions::table.find(id))
                .set(metadata_changeset(record, now))
                .execute(conn)
                .await?;
            Ok(SaveOutcome::Refreshed)
        }
    }
}

/// Diesel-based extension repository with compile-time query checking.
#[derive(Clone)]
pub struct ExtensionRepository {
    pool: SqlitePool,
}

impl ExtensionRepository {
    /// Create a new extension repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_once(&self, identifier: &str) -> Result<Option<Extension>, DbError> {
        let mut conn = self.pool.get().await;

        extensions::table
            .filter(extensions::identifier.eq(identifier))
            .select(ExtensionRow::as_select())
            .first(&mut *conn)
            .await
            .optional()
            .map(|opt| opt.map(Extension::from))
    }

    async fn insert_once(&self, record: &ExtensionRecord) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await;

        let inserted = diesel::insert_or_ignore_into(extensions::table)
            .values(new_extension(record, &now))
            .execute(&mut *conn)
            .await?;
        Ok(inserted > 0)
    }

    async fn update_once(&self, record: &ExtensionRecord) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await;

        let updated = diesel::update(
            extensions::table.filter(extensions::identifier.eq(&record.identifier)),
        )
        .set(metadata_changeset(record, &now))
        .execute(&mut *conn)
        .await?;
        Ok(updated > 0)
    }

    async fn identifiers_once(&self) -> Result<HashSet<String>, DbError> {
        let mut conn = self.pool.get().await;

        let identifiers: Vec<String> = extensions::table
            .select(extensions::identifier)
            .load(&mut *conn)
            .await?;
        Ok(identifiers.into_iter().collect())
    }

    async fn save_batch_once(
        &self,
        records: &[ExtensionRecord],
        policy: RefreshPolicy,
    ) -> Result<BatchOutcome, DbError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await;

        conn.transaction(|conn| {
            Box::pin(async move {
                let mut outcome = BatchOutcome::default();
                for record in records {
                    outcome.record(save_one(conn, record, policy, &now).await?);
                }
                Ok(outcome)
            })
        })
        .await
    }

    async fn pending_once(&self) -> Result<Vec<Extension>, DbError> {
        let mut conn = self.pool.get().await;

        extensions::table
            .filter(extensions::is_created.eq(0))
            .filter(extensions::url.is_not_null())
            .order(extensions::id.asc())
            .select(ExtensionRow::as_select())
            .load(&mut *conn)
            .await
            .map(|rows| rows.into_iter().map(Extension::from).collect())
    }

    async fn mark_archived_once(
        &self,
        identifier: &str,
        local_path: &str,
    ) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await;

        let updated = diesel::update(
            extensions::table
                .filter(extensions::identifier.eq(identifier))
                .filter(extensions::is_created.eq(0)),
        )
        .set((
            extensions::local_path.eq(Some(local_path)),
            extensions::is_created.eq(1),
            extensions::updated_at.eq(&now),
        ))
        .execute(&mut *conn)
        .await?;
        Ok(updated > 0)
    }

    async fn counts_once(&self) -> Result<ExtensionCounts, DbError> {
        let mut conn = self.pool.get().await;

        let total: i64 = extensions::table.count().get_result(&mut *conn).await?;
        let archived: i64 = extensions::table
            .filter(extensions::is_created.eq(1))
            .count()
            .get_result(&mut *conn)
            .await?;

        let total = total.max(0) as u64;
        let archived = archived.max(0) as u64;
        Ok(ExtensionCounts {
            total,
            archived,
            pending: total.saturating_sub(archived),
        })
    }
}

#[async_trait]
impl ExtensionStore for ExtensionRepository {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Extension>, DbError> {
        retry_busy(|| self.find_once(identifier)).await
    }

    async fn insert_if_absent(&self, record: &ExtensionRecord) -> Result<bool, DbError> {
        retry_busy(|| self.insert_once(record)).await
    }

    async fn update_metadata(&self, record: &ExtensionRecord) -> Result<bool, DbError> {
        retry_busy(|| self.update_once(record)).await
    }

    async fn existing_identifiers(&self) -> Result<HashSet<String>, DbError> {
        retry_busy(|| self.identifiers_once()).await
    }

    async fn save_batch(
        &self,
        records: &[ExtensionRecord],
        policy: RefreshPolicy,
    ) -> Result<BatchOutcome, DbError> {
        retry_busy(|| self.save_batch_once(records, policy)).await
    }

    async fn pending_archive(&self) -> Result<Vec<Extension>, DbError> {
        retry_busy(|| self.pending_once()).await
    }

    async fn mark_archived(&self, identifier: &str, local_path: &str) -> Result<bool, DbError> {
        retry_busy(|| self.mark_archived_once(identifier, local_path)).await
    }

    async fn counts(&self) -> Result<ExtensionCounts, DbError> {
        retry_busy(|| self.counts_once()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::run_migrations;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn setup_test_db() -> (ExtensionRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_url = format!("sqlite:{}", dir.path().join("test.db").display());

        run_migrations(&db_url).await.unwrap();
        let pool = SqlitePool::open(&db_url).await.unwrap();

        (ExtensionRepository::new(pool), dir)
    }

    fn sample(identifier: &str) -> ExtensionRecord {
        ExtensionRecord {
            name: Some(format!("{} name", identifier)),
            version: Some("1.0.0".into()),
            downloads: Some(1200),
            rating: Some(4.5),
            categories: Some(vec!["Linters".into(), "Other".into()]),
            last_updated: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            ..ExtensionRecord::new(identifier).with_url(format!(
                "https://marketplace.visualstudio.com/items?itemName={}",
                identifier
            ))
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (repo, _dir) = setup_test_db().await;

        assert!(repo.insert_if_absent(&sample("a.one")).await.unwrap());
        assert!(!repo.insert_if_absent(&sample("a.one")).await.unwrap());

        let found = repo.find_by_identifier("a.one").await.unwrap().unwrap();
        assert_eq!(found.record, sample("a.one"));
        assert_eq!(found.archive, ArchiveState::Pending);
        assert!(repo.find_by_identifier("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_batch_keep_skips_known() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_if_absent(&sample("a.one")).await.unwrap();

        let mut changed = sample("a.one");
        changed.version = Some("2.0.0".into());
        let outcome = repo
            .save_batch(&[changed, sample("a.two")], RefreshPolicy::Keep)
            .await
            .unwrap();

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.skipped, 1);
        let stored = repo.find_by_identifier("a.one").await.unwrap().unwrap();
        assert_eq!(stored.record.version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_save_batch_overwrite_keeps_archive_state() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_if_absent(&sample("a.one")).await.unwrap();
        assert!(repo.mark_archived("a.one", "/archive/a.one").await.unwrap());

        let mut changed = sample("a.one");
        changed.version = Some("2.0.0".into());
        changed.downloads = None;
        let outcome = repo
            .save_batch(&[changed], RefreshPolicy::Overwrite)
            .await
            .unwrap();

        assert_eq!(outcome.refreshed, 1);
        let stored = repo.find_by_identifier("a.one").await.unwrap().unwrap();
        assert_eq!(stored.record.version.as_deref(), Some("2.0.0"));
        assert_eq!(stored.record.downloads, None);
        assert_eq!(stored.archive.local_path(), Some("/archive/a.one"));
    }

    #[tokio::test]
    async fn test_mark_archived_only_once() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_if_absent(&sample("a.one")).await.unwrap();
        repo.insert_if_absent(&sample("a.two")).await.unwrap();

        assert_eq!(repo.pending_archive().await.unwrap().len(), 2);
        assert!(repo.mark_archived("a.one", "/first").await.unwrap());
        assert!(!repo.mark_archived("a.one", "/second").await.unwrap());

        let stored = repo.find_by_identifier("a.one").await.unwrap().unwrap();
        assert_eq!(stored.archive.local_path(), Some("/first"));

        let pending = repo.pending_archive().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identifier(), "a.two");

        let counts = repo.counts().await.unwrap();
        assert_eq!(
            counts,
            ExtensionCounts {
                total: 2,
                archived: 1,
                pending: 1
            }
        );
    }

    #[tokio::test]
    async fn test_pending_archive_requires_url() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_if_absent(&ExtensionRecord::new("no.url"))
            .await
            .unwrap();

        assert!(repo.pending_archive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let (repo, _dir) = setup_test_db().await;
        assert!(!repo.update_metadata(&sample("a.one")).await.unwrap());

        repo.insert_if_absent(&sample("a.one")).await.unwrap();
        let mut changed = sample("a.one");
        changed.tags = Some(vec!["python".into()]);
        assert!(repo.update_metadata(&changed).await.unwrap());

        let ids = repo.existing_identifiers().await.unwrap();
        assert!(ids.contains("a.one"));
        let stored = repo.find_by_identifier("a.one").await.unwrap().unwrap();
        assert_eq!(stored.record.tags, Some(vec!["python".to_string()]));
    }
}
