//! mien-store — durable key→value namespaces for the caches.
//!
//! One [`ContentStore`] is one logical namespace: a single SQLite database
//! file (`<dir>/<name>.store`) holding an ordered `key TEXT PRIMARY KEY`
//! table with JSON-encoded values. All operations run on the connection's
//! worker thread via `tokio-rusqlite`, so callers never block and no two
//! operations touch the store's internal state at once.
//!
//! Absence is explicit: [`ContentStore::get`] returns `Ok(None)` for a
//! missing key. The value column is NOT NULL, so a stored JSON `null` is
//! always distinguishable from "not found".

use std::path::{Path, PathBuf};

use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("value encoding: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("backend: {0}")]
    Backend(#[from] tokio_rusqlite::Error),
}

/// A single persistent key→value namespace.
///
/// Cloning is cheap and yields a handle to the same underlying connection.
#[derive(Clone, Debug)]
pub struct ContentStore {
    conn: Connection,
    path: PathBuf,
}

impl ContentStore {
    /// Open (or create) `<dir>/<name>.store`.
    ///
    /// Fails fast with [`StoreError::DirectoryNotFound`] when `dir` does not
    /// exist — stores never create their parent directory.
    pub async fn open(dir: &Path, name: &str) -> Result<Self, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::DirectoryNotFound(dir.to_path_buf()));
        }
        let path = dir.join(format!("{name}.store"));
        let conn = Connection::open(&path).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "wal")?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS entries (
                     key   TEXT PRIMARY KEY,
                     value BLOB NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(path = %path.display(), "content store opened");
        Ok(Self { conn, path })
    }

    /// Fetch and decode a value. `Ok(None)` when the key is absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let key = key.to_owned();
        let raw: Option<Vec<u8>> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("SELECT value FROM entries WHERE key = ?1")?;
                let mut rows = stmt.query(params![key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite a value (last-writer-wins).
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let key = key.to_owned();
        let bytes = serde_json::to_vec(value)?;
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO entries (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )?;
                stmt.execute(params![key, bytes])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Remove one key. Returns whether it was present.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_owned();
        let removed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("DELETE FROM entries WHERE key = ?1")?;
                Ok(stmt.execute(params![key])? > 0)
            })
            .await?;
        Ok(removed)
    }

    /// Keys starting with `prefix`, in key order, at most `limit` of them.
    /// Used for short-hash lookups from interactive tools.
    pub async fn keys_with_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let lower = prefix.to_owned();
        let upper = prefix_upper_bound(prefix);
        let keys = self
            .conn
            .call(move |conn| {
                let mut keys = Vec::new();
                match upper {
                    Some(upper) => {
                        let mut stmt = conn.prepare_cached(
                            "SELECT key FROM entries WHERE key >= ?1 AND key < ?2
                             ORDER BY key LIMIT ?3",
                        )?;
                        let mut rows = stmt.query(params![lower, upper, limit as i64])?;
                        while let Some(row) = rows.next()? {
                            keys.push(row.get(0)?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare_cached(
                            "SELECT key FROM entries WHERE key >= ?1 ORDER BY key LIMIT ?2",
                        )?;
                        let mut rows = stmt.query(params![lower, limit as i64])?;
                        while let Some(row) = rows.next()? {
                            keys.push(row.get(0)?);
                        }
                    }
                }
                Ok(keys)
            })
            .await?;
        Ok(keys)
    }

    /// Total number of entries (full scan is fine: the caches are read-mostly).
    pub async fn count(&self) -> Result<u64, StoreError> {
        let count = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(count as u64)
    }

    /// Irreversibly drop every entry. The store itself stays open and
    /// usable, so a destroyed cache can be repopulated immediately.
    pub async fn destroy(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM entries", [])?;
                conn.execute_batch("VACUUM;")?;
                Ok(())
            })
            .await?;
        tracing::info!(path = %self.path.display(), "content store destroyed");
        Ok(())
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Smallest key strictly greater than every key with the given prefix, for
/// range scans. `None` when no such bound exists (empty prefix, or a prefix
/// of only 0xFF bytes). Keys here are ASCII hex hashes, so incrementing the
/// last byte stays valid UTF-8.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(&last) = bytes.last() {
        if last < 0xff {
            *bytes.last_mut().expect("non-empty") = last + 1;
            return String::from_utf8(bytes).ok();
        }
        bytes.pop();
    }
    None
}
