//! In-memory collaborators.
//!
//! Implements every store trait over process memory. Used by tests and for
//! running the engine without a database. Failure injection lets callers
//! simulate an unreachable backend or a lost race on a unique key.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Certificate, Module, ModuleProgress, RewardGrant, RewardRequest, RewardSource, Training,
    TrainingProgress,
};
use crate::store::{CatalogSource, CertificateStore, ProgressStore, RewardIssuer};

/// Operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `upsert_module_progress` returns `Unavailable`
    ModuleProgressWrite,
    /// `upsert_training_progress` returns `Unavailable`
    TrainingProgressWrite,
    /// `grant_xp_and_coins` returns `Unavailable`
    RewardGrant,
    /// `create` certificate returns `Unavailable`
    CertificateCreate,
    /// `find_grant` reports nothing, as if a concurrent writer had not
    /// committed yet
    StaleGrantLookup,
    /// `create` certificate returns `Conflict` without storing anything, as
    /// if the number were taken by someone else
    CertificateNumberCollision,
}

#[derive(Default)]
struct State {
    trainings: HashMap<String, Training>,
    modules: HashMap<String, Vec<Module>>,
    module_progress: HashMap<(String, String), ModuleProgress>,
    training_progress: HashMap<(String, String), TrainingProgress>,
    grants: Vec<RewardGrant>,
    certificates: Vec<Certificate>,
}

/// In-memory implementation of all collaborator traits.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    failures: Arc<RwLock<HashMap<FailPoint, u32>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a training and its modules.
    pub async fn insert_training(&self, training: Training, modules: Vec<Module>) {
        let mut state = self.state.write().await;
        state.modules.insert(training.id.clone(), modules);
        state.trainings.insert(training.id.clone(), training);
    }

    /// Make the next `times` calls at `point` fail.
    pub async fn fail_next(&self, point: FailPoint, times: u32) {
        let mut failures = self.failures.write().await;
        *failures.entry(point).or_insert(0) += times;
    }

    pub async fn grant_count(&self) -> usize {
        self.state.read().await.grants.len()
    }

    pub async fn certificate_count(&self) -> usize {
        self.state.read().await.certificates.len()
    }

    pub async fn module_progress_count(&self) -> usize {
        self.state.read().await.module_progress.len()
    }

    async fn trip(&self, point: FailPoint) -> bool {
        let mut failures = self.failures.write().await;
        match failures.get_mut(&point) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    async fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.trip(point).await {
            return Err(StoreError::Unavailable(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for InMemoryStore {
    async fn fetch_training(&self, training_id: &str) -> Result<Option<Training>, StoreError> {
        Ok(self.state.read().await.trainings.get(training_id).cloned())
    }

    async fn fetch_modules(&self, training_id: &str) -> Result<Vec<Module>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .modules
            .get(training_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn upsert_module_progress(&self, record: &ModuleProgress) -> Result<(), StoreError> {
        self.check(FailPoint::ModuleProgressWrite).await?;
        let key = (record.user_id.clone(), record.module_id.clone());
        let mut state = self.state.write().await;
        let mut record = record.clone();
        if let Some(existing) = state.module_progress.get(&key) {
            if existing.is_completed() && !record.is_completed() {
                return Ok(());
            }
            record.completed_at = existing.completed_at.or(record.completed_at);
        }
        state.module_progress.insert(key, record);
        Ok(())
    }

    async fn get_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Option<ModuleProgress>, StoreError> {
        let key = (user_id.to_string(), module_id.to_string());
        Ok(self.state.read().await.module_progress.get(&key).cloned())
    }

    async fn read_all(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Vec<ModuleProgress>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .module_progress
            .values()
            .filter(|p| p.user_id == user_id && p.training_id == training_id)
            .cloned()
            .collect())
    }

    async fn get_training_progress(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Option<TrainingProgress>, StoreError> {
        let key = (user_id.to_string(), training_id.to_string());
        Ok(self.state.read().await.training_progress.get(&key).cloned())
    }

    async fn upsert_training_progress(&self, record: &TrainingProgress) -> Result<(), StoreError> {
        self.check(FailPoint::TrainingProgressWrite).await?;
        let key = (record.user_id.clone(), record.training_id.clone());
        let mut state = self.state.write().await;
        let mut record = record.clone();
        if let Some(existing) = state.training_progress.get(&key) {
            record.percentage = record.percentage.max(existing.percentage);
            record.completed_at = existing.completed_at.or(record.completed_at);
        }
        state.training_progress.insert(key, record);
        Ok(())
    }
}

#[async_trait]
impl RewardIssuer for InMemoryStore {
    async fn grant_xp_and_coins(&self, request: &RewardRequest) -> Result<RewardGrant, StoreError> {
        self.check(FailPoint::RewardGrant).await?;

        let mut state = self.state.write().await;
        let exists = state.grants.iter().any(|g| {
            g.user_id == request.user_id
                && g.source == request.source
                && g.source_id == request.source_id
        });
        if exists {
            return Err(StoreError::Conflict(format!(
                "{} grant for {} already exists",
                request.source, request.source_id
            )));
        }

        let grant = RewardGrant {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            xp: request.xp,
            coins: request.coins,
            source: request.source,
            source_id: request.source_id.clone(),
            granted_at: chrono::Utc::now(),
        };
        state.grants.push(grant.clone());
        Ok(grant)
    }

    async fn find_grant(
        &self,
        user_id: &str,
        source: RewardSource,
        source_id: &str,
    ) -> Result<Option<RewardGrant>, StoreError> {
        if self.trip(FailPoint::StaleGrantLookup).await {
            return Ok(None);
        }
        Ok(self
            .state
            .read()
            .await
            .grants
            .iter()
            .find(|g| g.user_id == user_id && g.source == source && g.source_id == source_id)
            .cloned())
    }

    async fn grants_for_user(&self, user_id: &str) -> Result<Vec<RewardGrant>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CertificateStore for InMemoryStore {
    async fn create(&self, certificate: &Certificate) -> Result<(), StoreError> {
        self.check(FailPoint::CertificateCreate).await?;
        if self.trip(FailPoint::CertificateNumberCollision).await {
            return Err(StoreError::Conflict(format!(
                "certificate number {} already used",
                certificate.certificate_number
            )));
        }

        let mut state = self.state.write().await;
        let taken = state.certificates.iter().any(|c| {
            c.certificate_number == certificate.certificate_number
                || (c.user_id == certificate.user_id && c.training_id == certificate.training_id)
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "certificate {} conflicts with an existing record",
                certificate.certificate_number
            )));
        }
        state.certificates.push(certificate.clone());
        Ok(())
    }

    async fn find(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .certificates
            .iter()
            .find(|c| c.user_id == user_id && c.training_id == training_id)
            .cloned())
    }

    async fn certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .certificates
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(source_id: &str) -> RewardRequest {
        RewardRequest {
            user_id: "u1".into(),
            xp: 10,
            coins: 1,
            source: RewardSource::ModuleCompletion,
            source_id: source_id.into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_grant_conflicts() {
        let store = InMemoryStore::new();
        store.grant_xp_and_coins(&request("m0")).await.unwrap();
        let err = store.grant_xp_and_coins(&request("m0")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.grant_count().await, 1);
    }

    #[tokio::test]
    async fn test_started_write_keeps_completion() {
        let store = InMemoryStore::new();
        let started = ModuleProgress::started("u1", "t1", "m0", Utc::now());
        let mut completed = started.clone();
        completed.completed_at = Some(Utc::now());
        completed.attempts = 1;

        store.upsert_module_progress(&completed).await.unwrap();
        store.upsert_module_progress(&started).await.unwrap();

        let read = store.get_module_progress("u1", "m0").await.unwrap().unwrap();
        assert_eq!(read, completed);
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let store = InMemoryStore::new();
        store.fail_next(FailPoint::ModuleProgressWrite, 1).await;
        let record = ModuleProgress::started("u1", "t1", "m0", Utc::now());
        assert!(store.upsert_module_progress(&record).await.is_err());
        assert!(store.upsert_module_progress(&record).await.is_ok());
        assert_eq!(store.module_progress_count().await, 1);
    }

    #[tokio::test]
    async fn test_certificate_never_overwritten() {
        let store = InMemoryStore::new();
        let cert = Certificate {
            user_id: "u1".into(),
            training_id: "t1".into(),
            certificate_number: "CERT-1".into(),
            issued_at: Utc::now(),
        };
        store.create(&cert).await.unwrap();

        let other = Certificate {
            user_id: "u2".into(),
            ..cert.clone()
        };
        assert!(matches!(store.create(&other).await, Err(StoreError::Conflict(_))));

        let again = Certificate {
            certificate_number: "CERT-2".into(),
            ..cert
        };
        assert!(matches!(store.create(&again).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.certificate_count().await, 1);
    }

    #[tokio::test]
    async fn test_read_all_scoped_to_training() {
        let store = InMemoryStore::new();
        store
            .upsert_module_progress(&ModuleProgress::started("u1", "t1", "a", Utc::now()))
            .await
            .unwrap();
        store
            .upsert_module_progress(&ModuleProgress::started("u1", "t2", "b", Utc::now()))
            .await
            .unwrap();
        store
            .upsert_module_progress(&ModuleProgress::started("u2", "t1", "a", Utc::now()))
            .await
            .unwrap();
        let rows = store.read_all("u1", "t1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].module_id, "a");
    }
}
