//! Training session: one learner playing through one training.
//!
//! The session owns the catalog (fetched once) and the learner's latest
//! progress snapshot. Navigation is synchronous against that snapshot;
//! anything that writes goes through the progress store or the completion
//! processor and refreshes the snapshot afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ModuleCatalog;
use crate::completion::{CompletionOutcome, CompletionProcessor};
use crate::error::EngineResult;
use crate::events::{EventBus, ProgressEvent};
use crate::lock;
use crate::model::{CompletionResult, Module, ModuleProgress, TrainingProgress};
use crate::navigation::NavigationController;
use crate::progress::{ProgressSnapshot, TrainingSummary};
use crate::store::ProgressStore;

/// Completion outcome plus what changed for navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCompletion {
    #[serde(flatten)]
    pub outcome: CompletionOutcome,
    /// Modules that were locked before this completion and are not now
    pub newly_unlocked: Vec<String>,
    /// Default navigation target. `None` means stay on the current module,
    /// or return to the training overview when the training is complete.
    pub next_module: Option<String>,
}

pub struct TrainingSession {
    user_id: String,
    catalog: Arc<ModuleCatalog>,
    progress: ProgressSnapshot,
    training_progress: Option<TrainingProgress>,
    nav: NavigationController,
    store: Arc<dyn ProgressStore>,
    processor: Arc<CompletionProcessor>,
    events: Arc<EventBus>,
}

impl TrainingSession {
    /// Read the learner's progress and position the session at the resume
    /// target. Nothing is written.
    pub async fn load(
        user_id: &str,
        catalog: Arc<ModuleCatalog>,
        store: Arc<dyn ProgressStore>,
        processor: Arc<CompletionProcessor>,
        events: Arc<EventBus>,
    ) -> EngineResult<Self> {
        let training_id = catalog.training().id.clone();
        let records = store.read_all(user_id, &training_id).await?;
        let progress = ProgressSnapshot::from_records(records);
        let training_progress = store.get_training_progress(user_id, &training_id).await?;
        let nav = NavigationController::resume(&catalog, &progress);

        debug!(
            user_id = %user_id,
            training_id = %training_id,
            current = %nav.current_id(),
            "Session loaded"
        );

        Ok(Self {
            user_id: user_id.to_string(),
            catalog,
            progress,
            training_progress,
            nav,
            store,
            processor,
            events,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn progress(&self) -> &ProgressSnapshot {
        &self.progress
    }

    pub fn training_progress(&self) -> Option<&TrainingProgress> {
        self.training_progress.as_ref()
    }

    pub fn current_module(&self) -> Option<&Module> {
        self.nav.current(&self.catalog)
    }

    pub fn can_go_previous(&self) -> bool {
        self.nav.can_go_previous(&self.catalog)
    }

    pub fn can_go_next(&self) -> bool {
        self.nav.can_go_next(&self.catalog, &self.progress)
    }

    pub fn is_locked(&self, module_id: &str) -> bool {
        lock::is_locked_id(module_id, &self.catalog, &self.progress)
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary::build(&self.catalog, &self.progress)
    }

    /// Mark the current module started, if it has no record yet.
    pub async fn begin(&mut self) -> EngineResult<()> {
        let module_id = self.nav.current_id().to_string();
        self.mark_started(&module_id).await
    }

    /// Move to `module_id` and mark it started. Locked modules are refused.
    pub async fn select_module(&mut self, module_id: &str) -> EngineResult<Module> {
        let module = self
            .nav
            .select(module_id, &self.catalog, &self.progress)?
            .clone();
        self.mark_started(&module.id).await?;
        Ok(module)
    }

    pub async fn go_next(&mut self) -> EngineResult<Module> {
        let module = self.nav.go_next(&self.catalog, &self.progress)?.clone();
        self.mark_started(&module.id).await?;
        Ok(module)
    }

    pub async fn go_previous(&mut self) -> EngineResult<Module> {
        let module = self.nav.go_previous(&self.catalog, &self.progress)?.clone();
        self.mark_started(&module.id).await?;
        Ok(module)
    }

    /// Submit a completion for the current module.
    pub async fn complete_current(&mut self, result: CompletionResult) -> EngineResult<SessionCompletion> {
        let module_id = self.nav.current_id().to_string();
        self.complete_module(&module_id, result).await
    }

    /// Submit a completion for any module of the training.
    pub async fn complete_module(
        &mut self,
        module_id: &str,
        result: CompletionResult,
    ) -> EngineResult<SessionCompletion> {
        let locked_before: HashSet<String> = lock::locked_module_ids(&self.catalog, &self.progress)
            .into_iter()
            .collect();

        let completed = self
            .processor
            .complete_with_snapshot(&self.user_id, &self.catalog, module_id, result)
            .await;
        let (outcome, snapshot) = match completed {
            Ok(done) => done,
            Err(e) => {
                // Part of the completion may already be written
                if let Err(refresh_err) = self.refresh().await {
                    debug!(error = %refresh_err, "Refresh after failed completion failed");
                }
                return Err(e);
            }
        };
        self.progress = snapshot;

        if !outcome.accepted {
            return Ok(SessionCompletion {
                outcome,
                newly_unlocked: Vec::new(),
                next_module: None,
            });
        }

        self.training_progress = self
            .store
            .get_training_progress(&self.user_id, &self.catalog.training().id)
            .await?;

        let locked_after: HashSet<String> = lock::locked_module_ids(&self.catalog, &self.progress)
            .into_iter()
            .collect();
        let newly_unlocked = self
            .catalog
            .modules()
            .iter()
            .filter(|m| locked_before.contains(&m.id) && !locked_after.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();

        let next_module = if outcome.training_now_complete {
            None
        } else {
            self.catalog
                .successor(module_id)
                .filter(|next| !locked_after.contains(&next.id))
                .map(|next| next.id.clone())
        };

        Ok(SessionCompletion {
            outcome,
            newly_unlocked,
            next_module,
        })
    }

    /// Re-read progress from the store.
    pub async fn refresh(&mut self) -> EngineResult<()> {
        let training_id = self.catalog.training().id.clone();
        let records = self.store.read_all(&self.user_id, &training_id).await?;
        self.progress = ProgressSnapshot::from_records(records);
        self.training_progress = self
            .store
            .get_training_progress(&self.user_id, &training_id)
            .await?;
        Ok(())
    }

    async fn mark_started(&mut self, module_id: &str) -> EngineResult<()> {
        if self.progress.get(module_id).is_some() {
            return Ok(());
        }
        // Another session may have written the row since this snapshot
        if let Some(existing) = self.store.get_module_progress(&self.user_id, module_id).await? {
            self.progress.upsert(existing);
            return Ok(());
        }

        let training_id = self.catalog.training().id.clone();
        let record = ModuleProgress::started(&self.user_id, &training_id, module_id, Utc::now());
        self.store.upsert_module_progress(&record).await?;
        self.progress.upsert(record);

        self.events.emit(ProgressEvent::ModuleStarted {
            user_id: self.user_id.clone(),
            training_id,
            module_id: module_id.to_string(),
        });
        Ok(())
    }
}
