mod accounts;
mod agents;
mod calls;
mod schema;

pub use accounts::{Account, ConfigStatus, ElevenLabsCredentials, TwilioCredentials};
pub use agents::{Agent, AgentKind};
pub use calls::{Call, CallDirection, CallStatus, CallUpsert};

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use schema::SCHEMA;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// SQLite-backed store shared by all handlers.
///
/// Synchronous rusqlite behind a tokio mutex. The mutex also serializes the
/// read-modify-write sequences (call upsert, phone assignment) against
/// concurrent webhook deliveries, so a duplicate or out-of-order delivery
/// for the same call sid can never interleave into a half-updated row.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;

        tracing::info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Map a stored RFC 3339 timestamp back to `DateTime<Utc>` inside a row
/// mapping closure.
pub(crate) fn timestamp_column(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, format!("bad timestamp {value:?}: {e}")))
}

pub(crate) fn bad_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}
