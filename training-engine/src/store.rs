//! Collaborator traits consumed by the engine.
//!
//! The catalog, progress ledger, reward ledger and certificate registry all
//! live in an external data store. The engine only sequences calls into
//! them; it never locks anything itself.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{
    Certificate, Module, ModuleProgress, RewardGrant, RewardRequest, RewardSource, Training,
    TrainingProgress,
};

/// Read-only source of training definitions.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_training(&self, training_id: &str) -> Result<Option<Training>, StoreError>;

    /// Modules of a training. Order is not guaranteed.
    async fn fetch_modules(&self, training_id: &str) -> Result<Vec<Module>, StoreError>;
}

/// Per-learner progress ledger, keyed by (user_id, module_id) with
/// last-write-wins semantics.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn upsert_module_progress(&self, record: &ModuleProgress) -> Result<(), StoreError>;

    async fn get_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Option<ModuleProgress>, StoreError>;

    /// Every module record of `user_id` within `training_id`.
    async fn read_all(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Vec<ModuleProgress>, StoreError>;

    async fn get_training_progress(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Option<TrainingProgress>, StoreError>;

    async fn upsert_training_progress(&self, record: &TrainingProgress) -> Result<(), StoreError>;
}

/// XP/coin ledger.
///
/// At most one grant may exist per (user, source, source_id). A second
/// grant for the same key must fail with [`StoreError::Conflict`] rather
/// than create a duplicate.
#[async_trait]
pub trait RewardIssuer: Send + Sync {
    async fn grant_xp_and_coins(&self, request: &RewardRequest) -> Result<RewardGrant, StoreError>;

    async fn find_grant(
        &self,
        user_id: &str,
        source: RewardSource,
        source_id: &str,
    ) -> Result<Option<RewardGrant>, StoreError>;

    async fn grants_for_user(&self, user_id: &str) -> Result<Vec<RewardGrant>, StoreError>;
}

/// Certificate registry.
///
/// `create` fails with [`StoreError::Conflict`] when the certificate number
/// is already used or the learner already holds a certificate for the
/// training. It never overwrites.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn create(&self, certificate: &Certificate) -> Result<(), StoreError>;

    async fn find(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Option<Certificate>, StoreError>;

    async fn certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>, StoreError>;
}

/// The four collaborators the engine talks to, shared behind `Arc`.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogSource>,
    pub progress: Arc<dyn ProgressStore>,
    pub rewards: Arc<dyn RewardIssuer>,
    pub certificates: Arc<dyn CertificateStore>,
}

impl Collaborators {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        progress: Arc<dyn ProgressStore>,
        rewards: Arc<dyn RewardIssuer>,
        certificates: Arc<dyn CertificateStore>,
    ) -> Self {
        Self {
            catalog,
            progress,
            rewards,
            certificates,
        }
    }

    /// Use one backend for all four roles.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CatalogSource + ProgressStore + RewardIssuer + CertificateStore + 'static,
    {
        Self {
            catalog: store.clone(),
            progress: store.clone(),
            rewards: store.clone(),
            certificates: store,
        }
    }
}
