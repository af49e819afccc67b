//! Engine entry point.
//!
//! Wires the collaborators, configuration and event bus together and hands
//! out per-learner [`TrainingSession`]s.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::ModuleCatalog;
use crate::completion::{CompletionOutcome, CompletionProcessor};
use crate::config::EngineConfig;
use crate::error::{CatalogError, EngineResult, StoreError};
use crate::events::EventBus;
use crate::model::CompletionResult;
use crate::session::TrainingSession;
use crate::store::Collaborators;

/// Training progression engine
pub struct ProgressEngine {
    deps: Collaborators,
    processor: Arc<CompletionProcessor>,
    events: Arc<EventBus>,
}

impl ProgressEngine {
    pub fn new(deps: Collaborators, config: EngineConfig) -> Self {
        let events = Arc::new(EventBus::with_capacity(config.event_capacity));
        let processor = Arc::new(CompletionProcessor::new(
            deps.clone(),
            config,
            events.clone(),
        ));
        Self {
            deps,
            processor,
            events,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    pub fn processor(&self) -> Arc<CompletionProcessor> {
        self.processor.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Fetch and validate the module catalog of a training.
    pub async fn load_catalog(&self, training_id: &str) -> EngineResult<ModuleCatalog> {
        let training = self
            .deps
            .catalog
            .fetch_training(training_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("training {}", training_id)))?;
        let modules = self.deps.catalog.fetch_modules(training_id).await?;
        debug!(training_id = %training_id, modules = modules.len(), "Catalog fetched");

        ModuleCatalog::new(training, modules).map_err(|e: CatalogError| {
            warn!(training_id = %training_id, error = %e, "Training catalog is invalid");
            e.into()
        })
    }

    /// Open a playback session for `user_id` in `training_id`.
    pub async fn open_session(&self, user_id: &str, training_id: &str) -> EngineResult<TrainingSession> {
        let catalog = Arc::new(self.load_catalog(training_id).await?);
        TrainingSession::load(
            user_id,
            catalog,
            self.deps.progress.clone(),
            self.processor.clone(),
            self.events.clone(),
        )
        .await
    }

    /// One-shot completion without holding a session.
    pub async fn complete_module(
        &self,
        user_id: &str,
        training_id: &str,
        module_id: &str,
        result: CompletionResult,
    ) -> EngineResult<CompletionOutcome> {
        let catalog = self.load_catalog(training_id).await?;
        self.processor
            .complete_module(user_id, &catalog, module_id, result)
            .await
    }
}
