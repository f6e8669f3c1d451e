//! SQL migration definitions for the Draftforge settings database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: settings, runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- System-governed generation settings, stored as typed strings
CREATE TABLE IF NOT EXISTS settings (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    value_type TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per pipeline run
CREATE TABLE IF NOT EXISTS runs (
    run_id             TEXT PRIMARY KEY,
    topic              TEXT NOT NULL,
    status             TEXT NOT NULL,
    word_count         INTEGER NOT NULL,
    verification_score REAL NOT NULL,
    output_path        TEXT NOT NULL,
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
