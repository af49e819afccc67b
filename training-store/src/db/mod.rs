//! SQLite database module for training progress
//!
//! ## Tables
//!
//! - `trainings` - Training metadata and completion rewards
//! - `modules` - Ordered modules, step config as JSON
//! - `module_progress` - Per (user, module) progress, PK user_id + module_id
//! - `training_progress` - Per (user, training) aggregate
//! - `reward_grants` - XP/coin ledger, one row per (user, source_type, source_id)
//! - `certificates` - One per (user, training), globally unique number

pub mod catalog;
pub mod certificates;
pub mod progress;
pub mod rewards;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StorageError;

/// SQLite database for catalog, progress and rewards
pub struct ProgressDb {
    conn: Mutex<Connection>,
}

impl ProgressDb {
    /// Open or create the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| StorageError::Internal(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| StorageError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            StorageError::Internal(format!("Failed to open in-memory SQLite: {}", e))
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| StorageError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.with_conn(schema::init_schema)
    }

    /// Run `f` with shared access to the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run `f` with exclusive access (transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, StorageError> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                training_count: count("trainings")?,
                module_count: count("modules")?,
                progress_count: count("module_progress")?,
                grant_count: count("reward_grants")?,
                certificate_count: count("certificates")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DbStats {
    pub training_count: u64,
    pub module_count: u64,
    pub progress_count: u64,
    pub grant_count: u64,
    pub certificate_count: u64,
}

/// Timestamps are stored as RFC 3339 text
pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

pub(crate) fn decode_time(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Parse(format!("invalid timestamp '{}': {}", text, e)))
}

pub(crate) fn decode_optional_time(
    text: Option<String>,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    text.as_deref().map(decode_time).transpose()
}
