//! Session Store
//!
//! Expiring key-value store for session records, backed by SQLite through an
//! r2d2 connection pool. Expiry is a property of the stored timestamp: a row
//! whose `expires_at` has passed is never returned, swept or not.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::models::session::{SessionData, SessionPatch, SessionRecord};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::ensure_parent_dir;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Durable map from session id to record, with absolute expiry.
///
/// Concurrent writes to one id race; the last write wins. The engine never
/// runs two writers against the same session.
pub trait SessionStore: Send + Sync {
    /// Store `data`, replacing any previous record, and reset its expiry.
    fn put(&self, session_id: &str, data: &SessionData) -> AppResult<()>;

    /// The record, unless absent or expired.
    fn get(&self, session_id: &str) -> AppResult<Option<SessionData>>;

    /// Shallow-merge `partial` into the record and refresh its expiry.
    /// `None` when the session is absent or expired.
    fn patch(&self, session_id: &str, partial: &SessionData) -> AppResult<Option<SessionData>>;
}

/// Typed access on top of any [`SessionStore`].
pub trait SessionStoreExt: SessionStore {
    fn save_record(&self, session_id: &str, record: &SessionRecord) -> AppResult<()> {
        self.put(session_id, &record.to_data()?)
    }

    /// Load and decode a record. An undecodable record reads as absent.
    fn load_record(&self, session_id: &str) -> AppResult<Option<SessionRecord>> {
        let Some(data) = self.get(session_id)? else {
            return Ok(None);
        };
        match SessionRecord::from_data(data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("[session_store] undecodable record for {}: {}", short_id(session_id), e);
                Ok(None)
            }
        }
    }

    fn apply_patch(&self, session_id: &str, patch: &SessionPatch) -> AppResult<Option<SessionRecord>> {
        match self.patch(session_id, &patch.to_data()?)? {
            Some(data) => Ok(Some(SessionRecord::from_data(data)?)),
            None => Ok(None),
        }
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
    ttl_secs: i64,
}

impl SqliteSessionStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path, ttl: Duration) -> AppResult<Self> {
        ensure_parent_dir(path)?;

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self::from_pool(pool, ttl);
        store.init_schema()?;
        tracing::info!(
            "[session_store] opened {} (ttl={}s)",
            path.display(),
            store.ttl_secs
        );
        Ok(store)
    }

    /// In-memory store for tests. A single pooled connection keeps one database.
    pub fn in_memory(ttl: Duration) -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self::from_pool(pool, ttl);
        store.init_schema()?;
        Ok(store)
    }

    fn from_pool(pool: DbPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(0) as u64)
    }

    fn init_schema(&self) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);",
        )?;
        Ok(())
    }

    fn sweep(conn: &rusqlite::Connection, now: i64) -> AppResult<()> {
        let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
        if removed > 0 {
            tracing::debug!("[session_store] swept {} expired session(s)", removed);
        }
        Ok(())
    }

    fn write(
        &self,
        conn: &rusqlite::Connection,
        session_id: &str,
        data: &SessionData,
        now: i64,
    ) -> AppResult<()> {
        let json = serde_json::to_string(data)?;
        conn.execute(
            "INSERT INTO sessions (session_id, data_json, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
            params![session_id, json, now, now.saturating_add(self.ttl_secs)],
        )?;
        Ok(())
    }

    fn read(conn: &rusqlite::Connection, session_id: &str, now: i64) -> AppResult<Option<SessionData>> {
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM sessions WHERE session_id = ?1 AND expires_at > ?2",
                params![session_id, now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&json) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => {
                tracing::warn!(
                    "[session_store] stored value for {} is not a JSON object",
                    short_id(session_id)
                );
                Ok(None)
            }
        }
    }

    pub fn put_at(&self, session_id: &str, data: &SessionData, now: i64) -> AppResult<()> {
        let conn = self.pool.get()?;
        Self::sweep(&conn, now)?;
        self.write(&conn, session_id, data, now)
    }

    pub fn get_at(&self, session_id: &str, now: i64) -> AppResult<Option<SessionData>> {
        let conn = self.pool.get()?;
        Self::sweep(&conn, now)?;
        Self::read(&conn, session_id, now)
    }

    pub fn patch_at(
        &self,
        session_id: &str,
        partial: &SessionData,
        now: i64,
    ) -> AppResult<Option<SessionData>> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        Self::sweep(&tx, now)?;
        let Some(mut current) = Self::read(&tx, session_id, now)? else {
            return Ok(None);
        };
        for (key, value) in partial {
            current.insert(key.clone(), value.clone());
        }
        self.write(&tx, session_id, &current, now)?;
        tx.commit()?;
        Ok(Some(current))
    }
}

impl SessionStore for SqliteSessionStore {
    fn put(&self, session_id: &str, data: &SessionData) -> AppResult<()> {
        self.put_at(session_id, data, now_epoch())
    }

    fn get(&self, session_id: &str) -> AppResult<Option<SessionData>> {
        self.get_at(session_id, now_epoch())
    }

    fn patch(&self, session_id: &str, partial: &SessionData) -> AppResult<Option<SessionData>> {
        self.patch_at(session_id, partial, now_epoch())
    }
}

/// Current Unix time in seconds.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// First eight characters of a session id, for log lines.
pub fn short_id(session_id: &str) -> &str {
    session_id
        .char_indices()
        .nth(8)
        .map(|(i, _)| &session_id[..i])
        .unwrap_or(session_id)
}
