//! Session record stores
//!
//! Records are JSON objects keyed by session id with an absolute expiry.
//! Expired records read as absent.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::RwLock;

use super::SessionError;

/// Contents of one session
pub type SessionData = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;

    async fn save(
        &self,
        id: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError>;

    /// Extend the expiry of an existing record
    async fn touch(&self, id: &str, expires_at: DateTime<Utc>) -> Result<(), SessionError>;

    async fn destroy(&self, id: &str) -> Result<(), SessionError>;
}

/// Ephemeral store, lost on drop
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, (SessionData, DateTime<Utc>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn expiry_of(&self, id: &str) -> Option<DateTime<Utc>> {
        self.records.read().await.get(id).map(|(_, exp)| *exp)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        let now = Utc::now();
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .filter(|(_, expires_at)| *expires_at >= now)
            .map(|(data, _)| data.clone()))
    }

    async fn save(
        &self,
        id: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.records
            .write()
            .await
            .insert(id.to_string(), (data.clone(), expires_at));
        Ok(())
    }

    async fn touch(&self, id: &str, expires_at: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(record) = self.records.write().await.get_mut(id) {
            record.1 = expires_at;
        }
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.records.write().await.remove(id);
        Ok(())
    }
}

/// Relational store backed by `SQLite`
///
/// Uses a `session (sid, sess, expire)` table. Queries run on the blocking
/// pool; the connection is shared behind a mutex.
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Create or open the session database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(SessionError::Io)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, SessionError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SessionError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session (
                sid TEXT PRIMARY KEY,
                sess TEXT NOT NULL,
                expire INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_session_expire ON session (expire);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await?;
        Ok(result?)
    }

    /// Delete expired records, returning how many were removed
    pub async fn prune_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now().timestamp();
        let removed = self
            .with_conn(move |conn| conn.execute("DELETE FROM session WHERE expire < ?1", [now]))
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired sessions");
        }
        Ok(removed)
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        let id = id.to_string();
        let now = Utc::now().timestamp();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT sess FROM session WHERE sid = ?1 AND expire >= ?2",
                    params![id, now],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        raw.map(|sess| serde_json::from_str(&sess))
            .transpose()
            .map_err(Into::into)
    }

    async fn save(
        &self,
        id: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let id = id.to_string();
        let sess = serde_json::to_string(data)?;
        let expire = expires_at.timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session (sid, sess, expire) VALUES (?1, ?2, ?3)",
                params![id, sess, expire],
            )
        })
        .await?;
        Ok(())
    }

    async fn touch(&self, id: &str, expires_at: DateTime<Utc>) -> Result<(), SessionError> {
        let id = id.to_string();
        let expire = expires_at.timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE session SET expire = ?2 WHERE sid = ?1",
                params![id, expire],
            )
        })
        .await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let id = id.to_string();
        self.with_conn(move |conn| conn.execute("DELETE FROM session WHERE sid = ?1", [id]))
            .await?;
        Ok(())
    }
}
