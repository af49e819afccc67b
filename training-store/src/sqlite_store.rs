//! SQLite-backed collaborators for the progression engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use training_engine::{
    CatalogSource, Certificate, CertificateStore, Collaborators, Module, ModuleProgress,
    ProgressStore, RewardGrant, RewardIssuer, RewardRequest, RewardSource, StoreError, Training,
    TrainingProgress,
};

use crate::db::{catalog, certificates, progress, rewards, ProgressDb};
use crate::error::StorageError;

/// Implements every collaborator trait over one [`ProgressDb`]
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<ProgressDb>,
}

impl SqliteStore {
    pub fn new(db: Arc<ProgressDb>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<ProgressDb> {
        &self.db
    }

    /// Collaborator bundle for [`training_engine::ProgressEngine`]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::shared(Arc::new(self.clone()))
    }

    fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, StorageError>,
    {
        self.db.with_conn(f).map_err(|e| {
            if !matches!(e, StorageError::Conflict(_) | StorageError::NotFound(_)) {
                warn!(error = %e, "SQLite operation failed");
            }
            e.into()
        })
    }
}

#[async_trait]
impl CatalogSource for SqliteStore {
    async fn fetch_training(&self, training_id: &str) -> Result<Option<Training>, StoreError> {
        self.run(|conn| catalog::get_training(conn, training_id))
    }

    async fn fetch_modules(&self, training_id: &str) -> Result<Vec<Module>, StoreError> {
        self.run(|conn| catalog::get_modules(conn, training_id))
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn upsert_module_progress(&self, record: &ModuleProgress) -> Result<(), StoreError> {
        self.run(|conn| progress::upsert_module_progress(conn, record))
    }

    async fn get_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Option<ModuleProgress>, StoreError> {
        self.run(|conn| progress::get_module_progress(conn, user_id, module_id))
    }

    async fn read_all(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Vec<ModuleProgress>, StoreError> {
        self.run(|conn| progress::list_module_progress(conn, user_id, training_id))
    }

    async fn get_training_progress(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Option<TrainingProgress>, StoreError> {
        self.run(|conn| progress::get_training_progress(conn, user_id, training_id))
    }

    async fn upsert_training_progress(&self, record: &TrainingProgress) -> Result<(), StoreError> {
        self.run(|conn| progress::upsert_training_progress(conn, record))
    }
}

#[async_trait]
impl RewardIssuer for SqliteStore {
    async fn grant_xp_and_coins(&self, request: &RewardRequest) -> Result<RewardGrant, StoreError> {
        let grant = RewardGrant {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            xp: request.xp,
            coins: request.coins,
            source: request.source,
            source_id: request.source_id.clone(),
            granted_at: Utc::now(),
        };
        self.run(|conn| rewards::insert_grant(conn, &grant))?;
        debug!(grant_id = %grant.id, source_id = %grant.source_id, "Grant row inserted");
        Ok(grant)
    }

    async fn find_grant(
        &self,
        user_id: &str,
        source: RewardSource,
        source_id: &str,
    ) -> Result<Option<RewardGrant>, StoreError> {
        self.run(|conn| rewards::find_grant(conn, user_id, source, source_id))
    }

    async fn grants_for_user(&self, user_id: &str) -> Result<Vec<RewardGrant>, StoreError> {
        self.run(|conn| rewards::list_grants(conn, user_id))
    }
}

#[async_trait]
impl CertificateStore for SqliteStore {
    async fn create(&self, certificate: &Certificate) -> Result<(), StoreError> {
        self.run(|conn| certificates::insert_certificate(conn, certificate))
    }

    async fn find(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        self.run(|conn| certificates::find_certificate(conn, user_id, training_id))
    }

    async fn certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>, StoreError> {
        self.run(|conn| certificates::list_certificates(conn, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::new(Arc::new(ProgressDb::open_in_memory().unwrap()))
    }

    fn request() -> RewardRequest {
        RewardRequest {
            user_id: "u1".into(),
            xp: 100,
            coins: 10,
            source: RewardSource::ModuleCompletion,
            source_id: "m1".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_grant_is_store_conflict() {
        let store = store();
        store.grant_xp_and_coins(&request()).await.unwrap();

        let err = store.grant_xp_and_coins(&request()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.grants_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_certificate_conflict_does_not_overwrite() {
        let store = store();
        let first = Certificate {
            user_id: "u1".into(),
            training_id: "t1".into(),
            certificate_number: "CERT-20250101-AAAAAAAA".into(),
            issued_at: Utc::now(),
        };
        store.create(&first).await.unwrap();

        let second = Certificate {
            certificate_number: "CERT-20250101-BBBBBBBB".into(),
            ..first.clone()
        };
        let err = store.create(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.find("u1", "t1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_missing_training_is_none() {
        let store = store();
        assert!(store.fetch_training("t1").await.unwrap().is_none());
        assert!(store.fetch_modules("t1").await.unwrap().is_empty());
    }
}
