// src/store.rs
//! # Intel Store
//!
//! SQLite-backed, append-only store of matched feed entries.
//!
//! The `title` column is UNIQUE and every insert goes through
//! `INSERT OR IGNORE`, so insert-if-absent is atomic: under any number of
//! concurrent writers, exactly one insert of a given title wins and the rest
//! observe `AlreadyPresent`. Rows are never updated or deleted.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "INTEL_DB_PATH";
pub const DEFAULT_DB_PATH: &str = "data/intel.db";

/// Longest summary we persist, in characters.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// A matched entry ready for insertion. The store assigns `id` and
/// `timestamp` and truncates the summary.
#[derive(Debug, Clone)]
pub struct NewIntel {
    pub source_name: String,
    pub category: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub matched_keyword: String,
}

/// A persisted row.
#[derive(Debug, Clone)]
pub struct IntelRecord {
    pub id: i64,
    pub source_name: String,
    pub category: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub matched_keyword: String,
    pub timestamp: String,
}

/// The two normal results of an insert. A duplicate title is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    AlreadyPresent,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(String),

    #[error("store lock poisoned")]
    Lock,
}

pub struct IntelStore {
    conn: Mutex<Connection>,
}

impl IntelStore {
    /// Open (or create) the database at `path`, including parent directories
    /// and the schema. Safe to call against an existing database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("creating database directory: {e}")))?;
        }
        let conn = Connection::open(path)?;
        Self::from_conn(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_conn(Connection::open_in_memory()?)
    }

    /// Open at `$INTEL_DB_PATH`, falling back to `data/intel.db`.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = std::env::var(ENV_DB_PATH).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        Self::open(path)
    }

    fn from_conn(conn: Connection) -> Result<Self, StoreError> {
        // A second process (or an overlapping scan) waits instead of failing
        // with SQLITE_BUSY.
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS intel (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL UNIQUE,
                link TEXT NOT NULL,
                summary TEXT NOT NULL,
                matched_keyword TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert unless a row with the same title already exists.
    pub fn insert_if_absent(&self, rec: &NewIntel) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let summary = crate::ingest::truncate_chars(&rec.summary, SUMMARY_MAX_CHARS);
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO intel
                (source_name, category, title, link, summary, matched_keyword, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                rec.source_name,
                rec.category,
                rec.title,
                rec.link,
                summary,
                rec.matched_keyword,
                timestamp,
            ],
        )?;
        if changed == 1 {
            Ok(InsertOutcome::Inserted(conn.last_insert_rowid()))
        } else {
            Ok(InsertOutcome::AlreadyPresent)
        }
    }

    /// The most recent `limit` records, newest first (descending id, which is
    /// insertion order).
    pub fn recent(&self, limit: u32) -> Result<Vec<IntelRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, source_name, category, title, link, summary, matched_keyword, timestamp
            FROM intel
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(IntelRecord {
                id: row.get(0)?,
                source_name: row.get(1)?,
                category: row.get(2)?,
                title: row.get(3)?,
                link: row.get(4)?,
                summary: row.get(5)?,
                matched_keyword: row.get(6)?,
                timestamp: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let n = conn.query_row("SELECT COUNT(*) FROM intel", [], |row| row.get(0))?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(title: &str) -> NewIntel {
        NewIntel {
            source_name: "Naval News".to_string(),
            category: "NAVAL".to_string(),
            title: title.to_string(),
            link: "https://example.test/a".to_string(),
            summary: "summary".to_string(),
            matched_keyword: "Drone".to_string(),
        }
    }

    #[test]
    fn second_insert_of_same_title_is_already_present() {
        let store = IntelStore::open_in_memory().unwrap();
        let first = store.insert_if_absent(&rec("Carrier drone trial")).unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));
        let second = store.insert_if_absent(&rec("Carrier drone trial")).unwrap();
        assert_eq!(second, InsertOutcome::AlreadyPresent);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn summary_is_truncated_to_limit() {
        let store = IntelStore::open_in_memory().unwrap();
        let mut r = rec("Long summary headline");
        r.summary = "x".repeat(500);
        store.insert_if_absent(&r).unwrap();
        let rows = store.recent(10).unwrap();
        assert_eq!(rows[0].summary.chars().count(), SUMMARY_MAX_CHARS);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let store = IntelStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert_if_absent(&rec(&format!("Headline {i}"))).unwrap();
        }
        let rows = store.recent(3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].title, "Headline 4");
        assert!(rows[0].id > rows[1].id && rows[1].id > rows[2].id);
    }

    #[test]
    fn duplicate_keeps_the_original_row() {
        let store = IntelStore::open_in_memory().unwrap();
        store.insert_if_absent(&rec("Keep me")).unwrap();
        let mut other = rec("Keep me");
        other.source_name = "Defense One".to_string();
        store.insert_if_absent(&other).unwrap();
        let rows = store.recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_name, "Naval News");
    }
}
