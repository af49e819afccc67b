//! Catalog import from JSON
//!
//! File format:
//!
//! ```json
//! {
//!   "training": { "id": "onboarding", "title": "Onboarding", "xp_reward": 500,
//!                 "coins_reward": 50, "certificate_enabled": true },
//!   "modules": [
//!     { "id": "welcome", "title": "Welcome", "position": 0,
//!       "step": { "step_type": "video", "url": "https://..." } },
//!     { "id": "check", "title": "Checkpoint", "position": 1, "is_checkpoint": true,
//!       "min_score": 70, "step": { "step_type": "quiz", "questions": [] } }
//!   ]
//! }
//! ```
//!
//! `training_id` may be omitted on modules; it defaults to the training's id.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use training_engine::{Module, ModuleCatalog, StepConfig, Training};

use crate::db::{catalog, ProgressDb};
use crate::error::StorageError;

/// Module entry as written in an import file
#[derive(Debug, Clone, Deserialize)]
struct ModuleInput {
    id: String,
    #[serde(default)]
    training_id: Option<String>,
    title: String,
    position: u32,
    step: StepConfig,
    #[serde(default)]
    duration_minutes: u32,
    #[serde(default)]
    xp_reward: u32,
    #[serde(default)]
    coins_reward: u32,
    #[serde(default)]
    is_checkpoint: bool,
    #[serde(default)]
    min_score: Option<u8>,
    #[serde(default)]
    is_preview: bool,
    #[serde(default)]
    is_optional: bool,
}

impl ModuleInput {
    fn into_module(self, training_id: &str) -> Module {
        Module {
            id: self.id,
            training_id: self.training_id.unwrap_or_else(|| training_id.to_string()),
            title: self.title,
            position: self.position,
            step: self.step,
            duration_minutes: self.duration_minutes,
            xp_reward: self.xp_reward,
            coins_reward: self.coins_reward,
            is_checkpoint: self.is_checkpoint,
            min_score: self.min_score,
            is_preview: self.is_preview,
            is_optional: self.is_optional,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    training: Training,
    modules: Vec<ModuleInput>,
}

/// What an import wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub training_id: String,
    pub title: String,
    pub module_count: usize,
    pub checkpoint_count: usize,
}

/// Parse and validate a catalog document without writing it
pub fn parse_catalog(json: &str) -> Result<ModuleCatalog, StorageError> {
    let file: CatalogFile = serde_json::from_str(json)?;
    let training_id = file.training.id.clone();
    let modules = file
        .modules
        .into_iter()
        .map(|m| m.into_module(&training_id))
        .collect();
    Ok(ModuleCatalog::new(file.training, modules)?)
}

/// Validate and store a catalog document
pub fn import_str(db: &ProgressDb, json: &str) -> Result<ImportReport, StorageError> {
    let parsed = parse_catalog(json)?;
    db.with_conn_mut(|conn| catalog::save_catalog(conn, &parsed))?;

    let report = ImportReport {
        training_id: parsed.training().id.clone(),
        title: parsed.training().title.clone(),
        module_count: parsed.len(),
        checkpoint_count: parsed.modules().iter().filter(|m| m.is_checkpoint).count(),
    };
    info!(
        training_id = %report.training_id,
        modules = report.module_count,
        checkpoints = report.checkpoint_count,
        "Catalog imported"
    );
    Ok(report)
}

/// Validate and store a catalog file
pub fn import_file(db: &ProgressDb, path: &Path) -> Result<ImportReport, StorageError> {
    let json = std::fs::read_to_string(path)?;
    import_str(db, &json)
}
