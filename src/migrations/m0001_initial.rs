use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE IF NOT EXISTS extensions (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    identifier TEXT NOT NULL,
    name TEXT,
    description TEXT,
    version TEXT,
    author TEXT,
    url TEXT,
    downloads INTEGER,
    installs INTEGER,
    last_updated TEXT,
    categories TEXT,
    rating REAL,
    review_count TEXT,
    tags TEXT,
    repository TEXT,
    license TEXT,
    local_path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE UNIQUE INDEX idx_extensions_identifier ON extensions(identifier)",
        ))
}
