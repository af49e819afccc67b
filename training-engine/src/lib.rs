//! Training Progression Engine
//!
//! Sequences a learner through the ordered modules of a training:
//!
//! - **Lock evaluation**: a module opens once its predecessor is completed
//!   (and, when the predecessor sets `min_score`, passed)
//! - **Navigation**: previous/next/select over the unlocked modules
//! - **Completion**: checkpoint gating, progress writes, aggregate
//!   percentage, XP/coin grants and certificates, each issued at most once
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             ProgressEngine               │
//! │   (load catalog, open sessions)          │
//! └───────────────────┬──────────────────────┘
//!                     │
//!        ┌────────────┴────────────┐
//!        ▼                         ▼
//! ┌───────────────┐        ┌────────────────────┐
//! │TrainingSession│───────▶│CompletionProcessor │
//! │ lock + nav    │        │ validate, persist, │
//! │ (pure, sync)  │        │ reward (async)     │
//! └───────────────┘        └─────────┬──────────┘
//!                                    ▼
//!          CatalogSource / ProgressStore / RewardIssuer / CertificateStore
//! ```
//!
//! The collaborators are traits; [`memory::InMemoryStore`] implements all
//! of them for tests, and `training-store` provides a SQLite backend.

pub mod catalog;
pub mod certificate;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lock;
pub mod memory;
pub mod model;
pub mod navigation;
pub mod progress;
pub mod session;
pub mod store;

// Re-exports
pub use catalog::ModuleCatalog;
pub use completion::{CertificateStatus, CompletionOutcome, CompletionProcessor, Rejection, RewardStatus};
pub use config::{EngineConfig, ScorePolicy};
pub use engine::ProgressEngine;
pub use error::{CatalogError, EngineError, EngineResult, StoreError};
pub use events::{EventBus, ProgressEvent};
pub use lock::is_locked;
pub use memory::InMemoryStore;
pub use model::*;
pub use navigation::NavigationController;
pub use progress::{ModuleStatus, ModuleSummary, ProgressSnapshot, TrainingSummary};
pub use session::{SessionCompletion, TrainingSession};
pub use store::{CatalogSource, CertificateStore, Collaborators, ProgressStore, RewardIssuer};
