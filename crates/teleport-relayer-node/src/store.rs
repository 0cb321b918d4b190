//! SQLite persistence for the relayer: event log, watermark and published roots.

use std::ops::DerefMut;
use std::path::Path;

use alloy::primitives::B256;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Acquire, Pool, Row, Sqlite, SqliteConnection};
use teleport_commitment::MigrationEvent;
use teleport_source_client::{ObservedEvent, Watermark};
use thiserror::Error;
use tokio::fs;

use crate::publisher::PublishedRoot;

/// An error that can occur when using the store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    SQLite(#[from] sqlx::Error),
    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupted store: {0}")]
    Corrupted(String),
}

/// Key of the last fully processed source log position
const WATERMARK_KEY: &str = "watermark";
/// Key of the last root known to be published on the destination ledger
const LAST_PUBLISHED_KEY: &str = "last_published";
/// Key of a root that was submitted but not yet confirmed
const PENDING_ROOT_KEY: &str = "pending_root";

/// A key-value store backed by SQLite.
#[derive(Debug)]
pub struct SQLiteStore {
    pool: Pool<Sqlite>,
}

impl SQLiteStore {
    /// Create a new SQLite store with externally created pool.
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        SQLiteStore { pool }
    }

    /// Acquire a connection from the pool.
    /// NOTE: if there's no available connection this function will fail after acquire timeout.
    pub async fn acquire_connection(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.pool.acquire().await
    }

    /// Initialize the underlying key-value table.
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.acquire_connection().await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );"#,
        )
        .execute(conn.deref_mut())
        .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.acquire_connection().await?;
        get_value(conn.deref_mut(), key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.acquire_connection().await?;
        set_value(conn.deref_mut(), key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.acquire_connection().await?;
        delete_value(conn.deref_mut(), key).await
    }

    /// Get a JSON-encoded value
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get(key)
            .await?
            .map(|value| serde_json::from_str(&value).map_err(StoreError::from))
            .transpose()
    }

    /// Set a JSON-encoded value
    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.set(key, &serde_json::to_string(value)?).await
    }
}

async fn get_value(
    executor: &mut SqliteConnection,
    key: &str,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query("SELECT value FROM store WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *executor)
        .await?;

    if let Some(row) = row {
        let value: String = row.try_get("value")?;
        Ok(Some(value))
    } else {
        Ok(None)
    }
}

async fn set_value(
    executor: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), StoreError> {
    sqlx::query("INSERT OR REPLACE INTO store (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(&mut *executor)
        .await?;
    Ok(())
}

async fn delete_value(executor: &mut SqliteConnection, key: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM store WHERE key = ?")
        .bind(key)
        .execute(&mut *executor)
        .await?;
    Ok(())
}

/// SQLite busy timeout in milliseconds
const SQLITE_BUSY_TIMEOUT: &str = "5000";

/// Maximum number of concurrent readers (size of the connection pool)
const SQLITE_MAX_CONCURRENT_READERS: u32 = 10;

/// SQLite-backed relayer store with single-writer and multi-reader pools.
/// - WAL mode for concurrent readers during writes
/// - Single writer (max_connections = 1)
/// - Accepted events and the watermark are written in one transaction
#[derive(Debug)]
pub struct AppStore(SQLiteStore);

impl AppStore {
    /// Create a store for a single atomic writer
    pub async fn single_atomic_writer<P: AsRef<Path>>(path: P) -> Result<Self, sqlx::Error> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("busy_timeout", SQLITE_BUSY_TIMEOUT);

        // Writer pool: single connection ensures single-writer semantics
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self(SQLiteStore::with_pool(pool));
        store.init().await?;

        Ok(store)
    }

    /// Create a store for multiple concurrent readers
    pub fn multiple_concurrent_readers<P: AsRef<Path>>(path: P) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONCURRENT_READERS)
            .connect_lazy_with(options);

        Self(SQLiteStore::with_pool(pool))
    }

    /// Initialize the store by creating the tables if missing
    async fn init(&self) -> Result<(), sqlx::Error> {
        // Key-value table for the relayer cursors
        self.0.init().await?;
        let mut conn = self.0.acquire_connection().await?;
        // Accepted migration events in log order
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                asset_id TEXT NOT NULL UNIQUE,
                event TEXT NOT NULL,
                position TEXT NOT NULL
            );"#,
        )
        .execute(conn.deref_mut())
        .await?;
        // History of roots published on the destination ledger
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS published_roots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                tx_ref TEXT
            );"#,
        )
        .execute(conn.deref_mut())
        .await?;
        Ok(())
    }

    /// Load all accepted events in log order
    pub async fn load_events(&self) -> Result<Vec<MigrationEvent>, StoreError> {
        let mut conn = self.0.acquire_connection().await?;
        let rows = sqlx::query("SELECT seq, event FROM events ORDER BY seq ASC")
            .fetch_all(conn.deref_mut())
            .await?;
        rows.iter()
            .enumerate()
            .map(|(expected, row)| {
                let seq: i64 = row.get("seq");
                if seq != expected as i64 {
                    return Err(StoreError::Corrupted(format!(
                        "gap in event log: expected position {expected}, found {seq}"
                    )));
                }
                let event: String = row.get("event");
                serde_json::from_str(&event).map_err(StoreError::from)
            })
            .collect()
    }

    /// Persist an accepted event at log position `seq` together with the new watermark
    pub async fn append_event(&self, seq: usize, observed: &ObservedEvent) -> Result<(), StoreError> {
        let mut conn = self.0.acquire_connection().await?;
        let mut tx = conn.begin().await?;

        sqlx::query("INSERT INTO events (seq, asset_id, event, position) VALUES (?, ?, ?, ?)")
            .bind(seq as i64)
            .bind(observed.event.source_asset_id.to_string())
            .bind(serde_json::to_string(&observed.event)?)
            .bind(serde_json::to_string(&observed.position)?)
            .execute(tx.deref_mut())
            .await?;
        set_value(
            tx.deref_mut(),
            WATERMARK_KEY,
            &serde_json::to_string(&observed.position)?,
        )
        .await?;

        tx.commit().await.map_err(StoreError::SQLite)
    }

    pub async fn set_watermark(&self, watermark: &Watermark) -> Result<(), StoreError> {
        self.0.set_json(WATERMARK_KEY, watermark).await
    }

    pub async fn get_watermark(&self) -> Result<Option<Watermark>, StoreError> {
        self.0.get_json(WATERMARK_KEY).await
    }

    pub async fn get_last_published(&self) -> Result<Option<PublishedRoot>, StoreError> {
        self.0.get_json(LAST_PUBLISHED_KEY).await
    }

    pub async fn get_pending_root(&self) -> Result<Option<B256>, StoreError> {
        self.0.get_json(PENDING_ROOT_KEY).await
    }

    /// Record a root about to be submitted, so an interrupted submission can be reconciled
    pub async fn set_pending_root(&self, root: &B256) -> Result<(), StoreError> {
        self.0.set_json(PENDING_ROOT_KEY, root).await
    }

    pub async fn clear_pending_root(&self) -> Result<(), StoreError> {
        self.0.delete(PENDING_ROOT_KEY).await
    }

    /// Record a confirmed root: append to the history, update the last published root
    /// and clear the pending marker in a single transaction
    pub async fn record_published(&self, published: &PublishedRoot) -> Result<(), StoreError> {
        let mut conn = self.0.acquire_connection().await?;
        let mut tx = conn.begin().await?;

        sqlx::query("INSERT INTO published_roots (root, published_at, tx_ref) VALUES (?, ?, ?)")
            .bind(published.root.to_string())
            .bind(published.published_at as i64)
            .bind(published.tx_ref.clone())
            .execute(tx.deref_mut())
            .await?;
        set_value(
            tx.deref_mut(),
            LAST_PUBLISHED_KEY,
            &serde_json::to_string(published)?,
        )
        .await?;
        delete_value(tx.deref_mut(), PENDING_ROOT_KEY).await?;

        tx.commit().await.map_err(StoreError::SQLite)
    }

    /// Most recently published roots, newest first
    pub async fn get_published_roots(&self, limit: u32) -> Result<Vec<PublishedRoot>, StoreError> {
        let mut conn = self.0.acquire_connection().await?;
        let rows = sqlx::query(
            "SELECT root, published_at, tx_ref FROM published_roots ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(conn.deref_mut())
        .await?;
        rows.iter()
            .map(|row| {
                let root: String = row.get("root");
                let published_at: i64 = row.get("published_at");
                Ok(PublishedRoot {
                    root: root
                        .parse()
                        .map_err(|_| StoreError::Corrupted(format!("invalid root {root}")))?,
                    published_at: published_at as u64,
                    tx_ref: row.get("tx_ref"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use teleport_source_client::LogPosition;

    fn observed(asset_id: u64, block_number: u64) -> ObservedEvent {
        ObservedEvent {
            event: MigrationEvent::new(
                U256::from(asset_id),
                Address::repeat_byte(0x11),
                U256::from(1_700_000_000u64),
                format!("Qm{asset_id}"),
            ),
            position: LogPosition::new(block_number, 0),
        }
    }

    #[tokio::test]
    async fn test_events_and_watermark_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayer.db");

        {
            let store = AppStore::single_atomic_writer(&path).await.unwrap();
            assert!(store.load_events().await.unwrap().is_empty());
            assert_eq!(store.get_watermark().await.unwrap(), None);

            store.append_event(0, &observed(7, 10)).await.unwrap();
            store.append_event(1, &observed(3, 12)).await.unwrap();
            store
                .set_watermark(&LogPosition::end_of_block(15))
                .await
                .unwrap();
        }

        let store = AppStore::single_atomic_writer(&path).await.unwrap();
        let events = store.load_events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].source_asset_id, U256::from(7));
        assert_eq!(events[1].source_asset_id, U256::from(3));
        assert_eq!(
            store.get_watermark().await.unwrap(),
            Some(LogPosition::end_of_block(15))
        );
    }

    #[tokio::test]
    async fn test_append_event_is_atomic_with_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppStore::single_atomic_writer(dir.path().join("relayer.db"))
            .await
            .unwrap();

        store.append_event(0, &observed(1, 5)).await.unwrap();
        assert_eq!(
            store.get_watermark().await.unwrap(),
            Some(LogPosition::new(5, 0))
        );

        // Same asset id again: the whole transaction is rolled back
        assert!(store.append_event(1, &observed(1, 9)).await.is_err());
        assert_eq!(
            store.get_watermark().await.unwrap(),
            Some(LogPosition::new(5, 0))
        );
        assert_eq!(store.load_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_published_roots_and_pending_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayer.db");
        let store = AppStore::single_atomic_writer(&path).await.unwrap();

        let first = B256::repeat_byte(1);
        let second = B256::repeat_byte(2);

        store.set_pending_root(&first).await.unwrap();
        assert_eq!(store.get_pending_root().await.unwrap(), Some(first));

        store
            .record_published(&PublishedRoot {
                root: first,
                published_at: 100,
                tx_ref: Some("0xabc".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(store.get_pending_root().await.unwrap(), None);

        store
            .record_published(&PublishedRoot {
                root: second,
                published_at: 120,
                tx_ref: None,
            })
            .await
            .unwrap();

        let last = store.get_last_published().await.unwrap().unwrap();
        assert_eq!(last.root, second);
        assert_eq!(last.published_at, 120);

        let readers = AppStore::multiple_concurrent_readers(&path);
        let history = readers.get_published_roots(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].root, second);
        assert_eq!(history[1].root, first);
        assert_eq!(history[1].tx_ref.as_deref(), Some("0xabc"));
        assert_eq!(readers.get_published_roots(1).await.unwrap().len(), 1);
    }
}
