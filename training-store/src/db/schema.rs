//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::StorageError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Current schema version (0 if not initialized)
pub fn get_schema_version(conn: &Connection) -> Result<i32, StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| StorageError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| StorageError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| StorageError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(PROGRESS_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create progress tables: {}", e)))?;

    conn.execute_batch(LEDGER_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create ledger tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS trainings (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    xp_reward INTEGER NOT NULL DEFAULT 0,
    coins_reward INTEGER NOT NULL DEFAULT 0,
    certificate_enabled INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Step config is the tagged JSON form of the step, e.g.
-- {"step_type":"quiz","questions":[...]}
CREATE TABLE IF NOT EXISTS modules (
    id TEXT PRIMARY KEY NOT NULL,
    training_id TEXT NOT NULL,
    title TEXT NOT NULL,
    position INTEGER NOT NULL,
    step_type TEXT NOT NULL,
    step_json TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL DEFAULT 0,
    xp_reward INTEGER NOT NULL DEFAULT 0,
    coins_reward INTEGER NOT NULL DEFAULT 0,
    is_checkpoint INTEGER NOT NULL DEFAULT 0,
    min_score INTEGER,
    is_preview INTEGER NOT NULL DEFAULT 0,
    is_optional INTEGER NOT NULL DEFAULT 0,
    UNIQUE (training_id, position),
    FOREIGN KEY (training_id) REFERENCES trainings(id) ON DELETE CASCADE
);
"#;

const PROGRESS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS module_progress (
    user_id TEXT NOT NULL,
    module_id TEXT NOT NULL,
    training_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    score INTEGER,
    time_spent_seconds INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    evidence_json TEXT,
    PRIMARY KEY (user_id, module_id)
);

CREATE TABLE IF NOT EXISTS training_progress (
    user_id TEXT NOT NULL,
    training_id TEXT NOT NULL,
    percentage INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    average_score INTEGER,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, training_id)
);
"#;

const LEDGER_SCHEMA: &str = r#"
-- Append-only; the unique key makes grants idempotent per source event
CREATE TABLE IF NOT EXISTS reward_grants (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    xp INTEGER NOT NULL,
    coins INTEGER NOT NULL,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    granted_at TEXT NOT NULL,
    UNIQUE (user_id, source_type, source_id)
);

CREATE TABLE IF NOT EXISTS certificates (
    certificate_number TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    training_id TEXT NOT NULL,
    issued_at TEXT NOT NULL,
    UNIQUE (user_id, training_id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_modules_training ON modules(training_id, position);
CREATE INDEX IF NOT EXISTS idx_module_progress_training ON module_progress(user_id, training_id);
CREATE INDEX IF NOT EXISTS idx_reward_grants_user ON reward_grants(user_id);
CREATE INDEX IF NOT EXISTS idx_certificates_user ON certificates(user_id);
"#;
