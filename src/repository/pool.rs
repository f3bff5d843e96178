//! SQLite connection handling.
//!
//! The store runs with a single connection shared behind an async mutex, so
//! every statement from the crawler and the archiver is serialized. Lock
//! contention from other processes is absorbed by `busy_timeout` first and by
//! [`retry_busy`] second.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::util::{is_busy_error, sqlite_path, to_diesel_error};

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

const CONNECTION_PRAGMAS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA busy_timeout = 3000;
    PRAGMA cache_size = -2048;
"#;

/// Attempts made by [`retry_busy`] before giving up.
pub const BUSY_RETRY_ATTEMPTS: u32 = 3;

const BUSY_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Single-connection SQLite pool.
#[derive(Clone)]
pub struct SqlitePool {
    database_url: String,
    conn: Arc<Mutex<SqliteConn>>,
}

impl SqlitePool {
    /// Open the database and apply connection pragmas.
    pub async fn open(database_url: &str) -> Result<Self, DbError> {
        let path = sqlite_path(database_url).to_string();
        debug!("Opening SQLite database at {}", path);

        let mut conn = SqliteConn::establish(&path)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(CONNECTION_PRAGMAS).await?;

        Ok(Self {
            database_url: path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Borrow the connection. Waits while another task holds it.
    pub async fn get(&self) -> MutexGuard<'_, SqliteConn> {
        self.conn.lock().await
    }

    /// Get the database path this pool was opened with.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Run `op`, retrying up to [`BUSY_RETRY_ATTEMPTS`] times while SQLite reports
/// the database as locked. Other errors are returned immediately.
pub async fn retry_busy<T, F, Fut>(mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if attempt < BUSY_RETRY_ATTEMPTS && is_busy_error(&e) => {
                warn!(
                    "Database busy (attempt {}/{}), retrying",
                    attempt, BUSY_RETRY_ATTEMPTS
                );
                tokio::time::sleep(BUSY_RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_busy_recovers() {
        let calls = AtomicU32::new(0);
        let result = retry_busy(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(to_diesel_error("database is locked"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_busy_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbError> = retry_busy(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(to_diesel_error("database is locked"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), BUSY_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_retry_busy_passes_other_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbError> = retry_busy(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::NotFound)
        })
        .await;

        assert!(matches!(result, Err(DbError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_enables_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pool.db");
        let pool = SqlitePool::open(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        assert_eq!(pool.database_url(), db_path.display().to_string());
        drop(pool);

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
