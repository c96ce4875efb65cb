//! SQLite Persistent Storage
//!
//! Durable protocol snapshots that survive service restarts, with reserve
//! and redemption tables for direct lookups. Uses connection pooling via
//! r2d2.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{StateChanges, StateStore, StorageError, StorageResult};
use crate::account_control::Reserve;
use crate::protocol::ProtocolState;
use crate::redemption::Redemption;
use crate::types::{AccountId, RedemptionId};

/// SQLite-backed state store with connection pooling
pub struct SqliteStateStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStateStore {
    /// Open (and migrate) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS protocol_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reserves (
                qc TEXT PRIMARY KEY,
                cap INTEGER NOT NULL,
                minted INTEGER NOT NULL,
                backing INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS redemptions (
                id TEXT PRIMARY KEY,
                qc TEXT NOT NULL,
                status TEXT NOT NULL,
                amount_sats INTEGER NOT NULL,
                deadline INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_redemptions_qc ON redemptions(qc);
            CREATE INDEX IF NOT EXISTS idx_redemptions_status ON redemptions(status);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn save_state_sync(
        &self,
        state: &ProtocolState,
        changes: &StateChanges,
    ) -> Result<(), StorageError> {
        let snapshot = to_json(state)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;

        tx.execute(
            r#"
            INSERT INTO protocol_state (id, state, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
            params![snapshot, chrono::Utc::now().timestamp()],
        )
        .map_err(db_error)?;

        for qc in &changes.reserves {
            let Some(reserve) = state.ledger.reserve(qc) else {
                tx.execute("DELETE FROM reserves WHERE qc = ?1", params![qc.to_string()])
                    .map_err(db_error)?;
                continue;
            };
            tx.execute(
                r#"
                INSERT INTO reserves (qc, cap, minted, backing, data) VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(qc) DO UPDATE SET
                    cap = excluded.cap,
                    minted = excluded.minted,
                    backing = excluded.backing,
                    data = excluded.data
                "#,
                params![
                    qc.to_string(),
                    index_value(reserve.cap),
                    index_value(reserve.minted),
                    index_value(reserve.backing),
                    to_json(reserve)?,
                ],
            )
            .map_err(db_error)?;
        }

        for id in &changes.redemptions {
            let Some(redemption) = state.redemptions.get_redemption(id) else {
                continue;
            };
            tx.execute(
                r#"
                INSERT INTO redemptions (id, qc, status, amount_sats, deadline, data)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    data = excluded.data
                "#,
                params![
                    redemption.id.to_string(),
                    redemption.qc.to_string(),
                    redemption.status.to_string(),
                    index_value(redemption.amount_sats),
                    index_value(redemption.deadline),
                    to_json(redemption)?,
                ],
            )
            .map_err(db_error)?;
        }

        tx.commit().map_err(db_error)?;
        Ok(())
    }

    fn load_state_sync(&self) -> Result<Option<ProtocolState>, StorageError> {
        let conn = self.conn()?;
        let snapshot: Option<String> = conn
            .query_row("SELECT state FROM protocol_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_error)?;

        snapshot.map(|s| from_json(&s)).transpose()
    }

    fn get_data_sync(&self, sql: &str, key: String) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(sql, params![key], |row| row.get(0))
            .optional()
            .map_err(db_error)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn save_state(
        &self,
        state: &ProtocolState,
        changes: &StateChanges,
    ) -> StorageResult<()> {
        self.save_state_sync(state, changes)
    }

    async fn load_state(&self) -> StorageResult<Option<ProtocolState>> {
        self.load_state_sync()
    }

    async fn get_reserve(&self, qc: &AccountId) -> StorageResult<Option<Reserve>> {
        self.get_data_sync("SELECT data FROM reserves WHERE qc = ?1", qc.to_string())?
            .map(|s| from_json(&s))
            .transpose()
    }

    async fn get_redemption(&self, id: &RedemptionId) -> StorageResult<Option<Redemption>> {
        self.get_data_sync("SELECT data FROM redemptions WHERE id = ?1", id.to_string())?
            .map(|s| from_json(&s))
            .transpose()
    }
}

/// Index columns are SQLite integers; values past `i64::MAX` saturate and
/// the exact figure stays in the `data` column.
fn index_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn db_error(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::InvalidData(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, StorageError> {
    serde_json::from_str(s).map_err(|e| StorageError::InvalidData(e.to_string()))
}
