use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_add_is_created")
        .depends_on(&["0001_initial_schema"])
        // Existing rows start out as not yet archived.
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "ALTER TABLE extensions ADD COLUMN is_created INTEGER NOT NULL DEFAULT 0",
        ))
        .operation(AddIndex::new(
            "extensions",
            Index::new("idx_extensions_is_created").column("is_created"),
        ))
}
