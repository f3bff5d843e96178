//! Persistence layer for extension records.

pub mod context;
pub mod diesel_models;
pub mod extension;
pub mod migrations;
pub mod pool;
pub mod store;
pub mod util;

pub use context::DbContext;
pub use extension::ExtensionRepository;
pub use migrations::run_migrations;
pub use pool::{retry_busy, DbError, SqliteConn, SqlitePool};
pub use store::{
    BatchOutcome, ExtensionCounts, ExtensionStore, RefreshPolicy, SaveOutcome,
};
