//! Error types for the training engine.
//!
//! Checkpoint rejections are not errors; they come back as a
//! [`CompletionOutcome`](crate::completion::CompletionOutcome) with
//! `accepted == false`. Everything here is either a data problem with the
//! catalog or a failure talking to one of the collaborators.

use thiserror::Error;

/// Failure reported by a collaborator (catalog source, progress store,
/// reward issuer, certificate store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the write
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// Unique key already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

/// Problems with the shape of a training's module list.
///
/// Any of these makes the training unplayable; the navigation controller
/// refuses to produce a current module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Training {0} has no modules")]
    Empty(String),

    #[error("Module {module_id} belongs to training {actual}, not {expected}")]
    ForeignModule {
        module_id: String,
        expected: String,
        actual: String,
    },

    #[error("Duplicate module id: {0}")]
    DuplicateModule(String),

    #[error("Ordinal positions must start at 0 or 1, found {0}")]
    BadFirstOrdinal(u32),

    #[error("Ordinal gap or duplicate: expected {expected}, found {found} (module {module_id})")]
    OrdinalGap {
        module_id: String,
        expected: u32,
        found: u32,
    },

    #[error("Module {module_id}: min_score {min_score} is outside 0-100")]
    InvalidThreshold { module_id: String, min_score: u8 },

    #[error("Module {module_id}: min_score set on non-scoring step type {step_type}")]
    UnscoredThreshold { module_id: String, step_type: String },
}

/// Top-level error for session and completion operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module is locked: {0}")]
    ModuleLocked(String),
}

impl EngineError {
    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Persistence(StoreError::Unavailable(_))
                | EngineError::Persistence(StoreError::Rejected(_))
                | EngineError::Persistence(StoreError::Internal(_))
        )
    }

    /// Message safe to show to a learner. Never includes backend error text.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Catalog(_) => {
                "This training is not available right now.".to_string()
            }
            EngineError::Persistence(_) => {
                "We couldn't save your progress. Please try again.".to_string()
            }
            EngineError::InvalidInput(_) => {
                "Your answer could not be processed. Please try again.".to_string()
            }
            EngineError::ModuleNotFound(_) => "This module could not be found.".to_string(),
            EngineError::ModuleLocked(_) => {
                "Complete the previous module to unlock this one.".to_string()
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
