//! Metadata store for Docshelf
//!
//! One SQLite table keyed by canonical path. Every method canonicalizes the
//! paths it is given before touching the database, and every mutation is a
//! single statement (or a single transaction), so a failed call leaves the
//! previous state intact.

mod schema;

use crate::error::{Error, Result};
use crate::paths::{canonical_key, dir_prefix};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use schema::SCHEMA_VERSION;

/// How far the reader has got with a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingState {
    #[default]
    Unread,
    Reading,
    Read,
}

impl ReadingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingState::Unread => "unread",
            ReadingState::Reading => "reading",
            ReadingState::Read => "read",
        }
    }
}

impl fmt::Display for ReadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "unread" | "" => Ok(ReadingState::Unread),
            "reading" => Ok(ReadingState::Reading),
            "read" => Ok(ReadingState::Read),
            other => Err(Error::InvalidReadingState(other.to_string())),
        }
    }
}

impl ToSql for ReadingState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReadingState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(ReadingState::Unread),
            other => other
                .as_str()?
                .parse()
                .map_err(|e: Error| FromSqlError::Other(Box::new(e))),
        }
    }
}

/// Descriptive metadata for one tracked file
///
/// Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub to_read: bool,
    #[serde(default)]
    pub reading_state: ReadingState,
    #[serde(default)]
    pub last_opened_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// An otherwise blank record for `path`
    pub fn new(path: impl Into<String>) -> Self {
        DocumentRecord {
            path: path.into(),
            ..Default::default()
        }
    }
}

const RECORD_COLUMNS: &str = "path, title, author, venue, year, tag, abstract, doi, url, \
                              favorite, to_read, reading_state, last_opened_at";

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    let opened: Option<i64> = row.get(12)?;
    Ok(DocumentRecord {
        path: row.get(0)?,
        title: text(row, 1)?,
        author: text(row, 2)?,
        venue: text(row, 3)?,
        year: text(row, 4)?,
        tag: text(row, 5)?,
        abstract_text: text(row, 6)?,
        doi: text(row, 7)?,
        url: text(row, 8)?,
        favorite: row.get(9)?,
        to_read: row.get(10)?,
        reading_state: row.get(11)?,
        last_opened_at: opened.map(DateTime::from_timestamp_nanos),
    })
}

fn to_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// The metadata store
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Store { conn, path };
        store.ensure_schema()?;

        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Store {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.conn)
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -------------------------------------------------------------------------
    // Single-record operations
    // -------------------------------------------------------------------------

    /// Look up the record for a path. A missing record is `Ok(None)`.
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Result<Option<DocumentRecord>> {
        let key = canonical_key(path);
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE path = ?1", RECORD_COLUMNS),
                [&key],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or fully replace the row for `record.path`.
    ///
    /// Every descriptive and status column takes the value given, so fields
    /// left blank in `record` are blanked in the store. `last_opened_at` is
    /// only written when the row is first created; afterwards it belongs to
    /// [`Store::record_opened`]. Use [`Store::update`] for partial edits.
    pub fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        let key = canonical_key(&record.path);
        self.conn.execute(
            "INSERT INTO documents
             (path, title, author, venue, year, tag, abstract, doi, url,
              favorite, to_read, reading_state, last_opened_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(path) DO UPDATE SET
               title = excluded.title,
               author = excluded.author,
               venue = excluded.venue,
               year = excluded.year,
               tag = excluded.tag,
               abstract = excluded.abstract,
               doi = excluded.doi,
               url = excluded.url,
               favorite = excluded.favorite,
               to_read = excluded.to_read,
               reading_state = excluded.reading_state",
            params![
                key,
                record.title,
                record.author,
                record.venue,
                record.year,
                record.tag,
                record.abstract_text,
                record.doi,
                record.url,
                record.favorite,
                record.to_read,
                record.reading_state,
                record.last_opened_at.map(to_nanos),
            ],
        )?;
        Ok(())
    }

    /// Read-modify-write of one record inside a transaction.
    ///
    /// Starts from a blank record when the path is untracked. Returns the
    /// record as stored.
    pub fn update<P, F>(&self, path: P, edit: F) -> Result<DocumentRecord>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut DocumentRecord),
    {
        let key = canonical_key(path);
        let tx = self.conn.unchecked_transaction()?;

        let mut record = self.get(&key)?.unwrap_or_else(|| DocumentRecord::new(&key));
        edit(&mut record);
        record.path = key;
        self.upsert(&record)?;

        tx.commit()?;
        Ok(record)
    }

    /// Rewrite the key of one record. Untracked paths are ignored.
    ///
    /// A stale row already sitting at `new` is replaced by the moved record.
    pub fn move_path<P: AsRef<Path>, Q: AsRef<Path>>(&self, old: P, new: Q) -> Result<()> {
        let old = canonical_key(old);
        let new = canonical_key(new);
        if old == new {
            return Ok(());
        }
        let moved = self.conn.execute(
            "UPDATE OR REPLACE documents SET path = ?1 WHERE path = ?2",
            params![new, old],
        )?;
        tracing::debug!("move_path {} -> {} ({} row)", old, new, moved);
        Ok(())
    }

    /// Rewrite every record strictly inside directory `old_dir` so it lives
    /// under `new_dir` instead. The directory's own record is untouched.
    ///
    /// Returns the number of records moved.
    pub fn move_tree<P: AsRef<Path>, Q: AsRef<Path>>(&self, old_dir: P, new_dir: Q) -> Result<usize> {
        let old_prefix = dir_prefix(&canonical_key(old_dir));
        let new_prefix = dir_prefix(&canonical_key(new_dir));
        if old_prefix == new_prefix {
            return Ok(0);
        }
        // substr/length rather than LIKE: '%' and '_' are legal in file names
        let moved = self.conn.execute(
            "UPDATE OR REPLACE documents
             SET path = ?2 || substr(path, length(?1) + 1)
             WHERE substr(path, 1, length(?1)) = ?1",
            params![old_prefix, new_prefix],
        )?;
        tracing::debug!("move_tree {} -> {} ({} rows)", old_prefix, new_prefix, moved);
        Ok(moved)
    }

    /// Remove the record for one path. Returns whether a row existed.
    pub fn delete_path<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let key = canonical_key(path);
        let deleted = self
            .conn
            .execute("DELETE FROM documents WHERE path = ?1", [&key])?;
        Ok(deleted > 0)
    }

    /// Remove every record strictly inside directory `dir`.
    pub fn delete_tree<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        let prefix = dir_prefix(&canonical_key(dir));
        let deleted = self.conn.execute(
            "DELETE FROM documents WHERE substr(path, 1, length(?1)) = ?1",
            [&prefix],
        )?;
        Ok(deleted)
    }

    /// Stamp a document as opened at `at`, creating a minimal record if needed.
    pub fn record_opened<P: AsRef<Path>>(&self, path: P, at: DateTime<Utc>) -> Result<()> {
        let key = canonical_key(path);
        self.conn.execute(
            "INSERT INTO documents (path, last_opened_at) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET last_opened_at = excluded.last_opened_at",
            params![key, to_nanos(at)],
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Up to `limit` opened records, most recent first, ties broken by path.
    pub fn list_recently_opened(&self, limit: usize) -> Result<Vec<DocumentRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_records(
            &format!(
                "SELECT {} FROM documents
                 WHERE last_opened_at IS NOT NULL
                 ORDER BY last_opened_at DESC, path ASC
                 LIMIT ?1",
                RECORD_COLUMNS
            ),
            [limit],
        )
    }

    /// Records flagged as favorite, ordered by path
    pub fn list_favorites(&self) -> Result<Vec<DocumentRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM documents WHERE favorite = 1 ORDER BY path",
                RECORD_COLUMNS
            ),
            [],
        )
    }

    /// Records flagged as to-read, ordered by path
    pub fn list_to_read(&self) -> Result<Vec<DocumentRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM documents WHERE to_read = 1 ORDER BY path",
                RECORD_COLUMNS
            ),
            [],
        )
    }

    /// Number of tracked records
    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query_records<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
