//! Progress snapshot and aggregation.
//!
//! Tracks per-module records for one (user, training) and derives the
//! training-level numbers shown next to the player: completion percentage,
//! average score, earned rewards and per-module status.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::ModuleCatalog;
use crate::lock;
use crate::model::{rounded_percent, Module, ModuleProgress, StepType};

/// Module progress records of one learner, keyed by module id.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    by_module: HashMap<String, ModuleProgress>,
}

impl ProgressSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = ModuleProgress>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot
    }

    /// Insert or replace the record for its module.
    pub fn upsert(&mut self, record: ModuleProgress) {
        self.by_module.insert(record.module_id.clone(), record);
    }

    pub fn get(&self, module_id: &str) -> Option<&ModuleProgress> {
        self.by_module.get(module_id)
    }

    pub fn is_completed(&self, module_id: &str) -> bool {
        self.get(module_id).map(|p| p.is_completed()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.by_module.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_module.is_empty()
    }

    /// Completed modules that belong to `catalog`. Stale rows for modules no
    /// longer in the catalog are ignored.
    pub fn completed_count(&self, catalog: &ModuleCatalog) -> usize {
        catalog
            .modules()
            .iter()
            .filter(|m| self.is_completed(&m.id))
            .count()
    }
}

/// round(100 * completed / total) over the catalog's modules.
pub fn completion_percentage(catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> u8 {
    rounded_percent(progress.completed_count(catalog), catalog.len())
}

/// Rounded mean of recorded scores on completed modules.
pub fn average_score(catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> Option<u8> {
    let scores: Vec<u32> = catalog
        .modules()
        .iter()
        .filter_map(|m| progress.get(&m.id))
        .filter(|p| p.is_completed())
        .filter_map(|p| p.score.map(u32::from))
        .collect();

    if scores.is_empty() {
        return None;
    }
    let total: u32 = scores.iter().sum();
    Some(((total as f64) / (scores.len() as f64)).round() as u8)
}

/// Display state of a module in the training outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Locked,
    Available,
    InProgress,
    Completed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Locked => "locked",
            ModuleStatus::Available => "available",
            ModuleStatus::InProgress => "in_progress",
            ModuleStatus::Completed => "completed",
        }
    }
}

/// Completed wins over locked: a completed module stays completed even if
/// its predecessor's record was later reset.
pub fn module_status(module: &Module, catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> ModuleStatus {
    match progress.get(&module.id) {
        Some(p) if p.is_completed() => ModuleStatus::Completed,
        _ if lock::is_locked(module, catalog, progress) => ModuleStatus::Locked,
        Some(_) => ModuleStatus::InProgress,
        None => ModuleStatus::Available,
    }
}

/// One row of the training outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module_id: String,
    pub title: String,
    pub position: u32,
    pub step_type: StepType,
    pub status: ModuleStatus,
    pub score: Option<u8>,
    pub is_checkpoint: bool,
    pub is_optional: bool,
    pub min_score: Option<u8>,
}

/// Aggregate view of a learner's progress through one training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub training_id: String,
    pub total_modules: usize,
    pub completed_modules: usize,
    pub percentage: u8,
    pub average_score: Option<u8>,
    /// XP and coins of completed modules (training reward not included)
    pub xp_earned: u64,
    pub coins_earned: u64,
    pub time_spent_seconds: u64,
    pub estimated_minutes_remaining: u64,
    pub modules: Vec<ModuleSummary>,
}

impl TrainingSummary {
    pub fn build(catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> Self {
        let mut xp_earned = 0u64;
        let mut coins_earned = 0u64;
        let mut time_spent_seconds = 0u64;
        let mut estimated_minutes_remaining = 0u64;
        let mut modules = Vec::with_capacity(catalog.len());

        for module in catalog.modules() {
            let record = progress.get(&module.id);
            let status = module_status(module, catalog, progress);

            if let Some(r) = record {
                time_spent_seconds = time_spent_seconds.saturating_add(r.time_spent_seconds);
            }
            if status == ModuleStatus::Completed {
                xp_earned += u64::from(module.xp_reward);
                coins_earned += u64::from(module.coins_reward);
            } else {
                estimated_minutes_remaining += u64::from(module.duration_minutes);
            }

            modules.push(ModuleSummary {
                module_id: module.id.clone(),
                title: module.title.clone(),
                position: module.position,
                step_type: module.step_type(),
                status,
                score: record.and_then(|r| r.score),
                is_checkpoint: module.is_checkpoint,
                is_optional: module.is_optional,
                min_score: module.min_score,
            });
        }

        Self {
            training_id: catalog.training().id.clone(),
            total_modules: catalog.len(),
            completed_modules: progress.completed_count(catalog),
            percentage: completion_percentage(catalog, progress),
            average_score: average_score(catalog, progress),
            xp_earned,
            coins_earned,
            time_spent_seconds,
            estimated_minutes_remaining,
            modules,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_modules > 0 && self.completed_modules == self.total_modules
    }
}
