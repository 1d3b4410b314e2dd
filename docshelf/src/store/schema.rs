//! Database schema for Docshelf

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 2;

/// SQL to create the database schema
const SCHEMA_SQL: &str = r#"
-- One row per tracked document, keyed by canonical path
CREATE TABLE IF NOT EXISTS documents (
    path TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    venue TEXT NOT NULL DEFAULT '',
    year TEXT NOT NULL DEFAULT '',
    tag TEXT NOT NULL DEFAULT '',
    abstract TEXT NOT NULL DEFAULT '',
    doi TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    favorite INTEGER NOT NULL DEFAULT 0,
    to_read INTEGER NOT NULL DEFAULT 0,
    reading_state TEXT NOT NULL DEFAULT 'unread',
    last_opened_at INTEGER  -- nanoseconds since the Unix epoch, NULL if never opened
);

CREATE INDEX IF NOT EXISTS idx_documents_last_opened ON documents(last_opened_at);
CREATE INDEX IF NOT EXISTS idx_documents_favorite ON documents(favorite);
CREATE INDEX IF NOT EXISTS idx_documents_to_read ON documents(to_read);

-- Index state (schema version and similar bookkeeping)
CREATE TABLE IF NOT EXISTS index_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Columns added after version 1, which only knew the bibliographic basics.
const V2_COLUMNS: &[(&str, &str)] = &[
    ("tag", "TEXT NOT NULL DEFAULT ''"),
    ("abstract", "TEXT NOT NULL DEFAULT ''"),
    ("doi", "TEXT NOT NULL DEFAULT ''"),
    ("url", "TEXT NOT NULL DEFAULT ''"),
    ("favorite", "INTEGER NOT NULL DEFAULT 0"),
    ("to_read", "INTEGER NOT NULL DEFAULT 0"),
    ("reading_state", "TEXT NOT NULL DEFAULT 'unread'"),
    ("last_opened_at", "INTEGER"),
];

/// Ensure the database schema is up to date
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_state'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        conn.execute_batch(SCHEMA_SQL)?;

        conn.execute(
            "INSERT INTO index_state (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;

        tracing::info!("Created database schema version {}", SCHEMA_VERSION);
    } else {
        let version: i64 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM index_state WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            migrate(conn, version)?;
        }
    }

    Ok(())
}

/// Migrate from an older schema version
fn migrate(conn: &Connection, from_version: i64) -> Result<()> {
    tracing::info!(
        "Migrating database from version {} to {}",
        from_version,
        SCHEMA_VERSION
    );

    let tx = conn.unchecked_transaction()?;

    if from_version < 2 {
        let existing = column_names(&tx, "documents")?;
        for (name, decl) in V2_COLUMNS {
            if !existing.iter().any(|c| c == name) {
                tx.execute_batch(&format!(
                    "ALTER TABLE documents ADD COLUMN {} {}",
                    name, decl
                ))?;
            }
        }
        // Picks up the indexes that reference the new columns
        tx.execute_batch(SCHEMA_SQL)?;
    }

    tx.execute(
        "INSERT OR REPLACE INTO index_state (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;

    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}
