//! Training Store
//!
//! SQLite persistence for the training progression engine: catalogs,
//! per-learner progress, the XP/coin ledger and certificates. Duplicate
//! grants and certificates are refused by UNIQUE keys and surface as
//! `StoreError::Conflict`, which the engine treats as already satisfied.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use training_engine::{EngineConfig, ProgressEngine};
//! use training_store::{ProgressDb, SqliteStore};
//!
//! let db = Arc::new(ProgressDb::open(&path)?);
//! let store = SqliteStore::new(db);
//! let engine = ProgressEngine::new(store.collaborators(), EngineConfig::default());
//! let mut session = engine.open_session("learner-1", "onboarding").await?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod sqlite_store;

pub use config::Config;
pub use db::{DbStats, ProgressDb};
pub use error::StorageError;
pub use import::{import_file, import_str, ImportReport};
pub use sqlite_store::SqliteStore;
