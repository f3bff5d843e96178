//! Database context: opens the store and hands out repositories.

use super::extension::ExtensionRepository;
use super::migrations::run_migrations;
use super::pool::{DbError, SqlitePool};

/// Create one context per command, then use it to access repositories.
#[derive(Clone)]
pub struct DbContext {
    pool: SqlitePool,
}

impl DbContext {
    /// Run pending migrations, then open the connection.
    pub async fn open(database_url: &str) -> Result<Self, DbError> {
        run_migrations(database_url).await?;
        let pool = SqlitePool::open(database_url).await?;
        Ok(Self { pool })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get an extension repository.
    pub fn extensions(&self) -> ExtensionRepository {
        ExtensionRepository::new(self.pool.clone())
    }
}
