use async_trait::async_trait;
use exam_core::model::{AssessmentId, EngineSettings, RecoverySnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable key-value home of recovery snapshots, keyed by assessment id.
///
/// One entry per assessment; a put replaces whatever was there
/// (last write wins).
#[async_trait]
pub trait RecoveryRepository: Send + Sync {
    /// Insert or replace the snapshot for `snapshot.assessment_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn put_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), StorageError>;

    /// Fetch the raw stored snapshot, without any validity checks.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for connection or decoding failures.
    async fn get_snapshot(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<RecoverySnapshot>, StorageError>;

    /// Remove the snapshot. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_snapshot(&self, assessment_id: &AssessmentId) -> Result<bool, StorageError>;
}

/// Persistence for engine settings (single row).
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` for connection or decoding failures.
    async fn get_settings(&self) -> Result<Option<EngineSettings>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the settings cannot be stored.
    async fn save_settings(&self, settings: &EngineSettings) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<AssessmentId, RecoverySnapshot>>>,
    settings: Arc<Mutex<Option<EngineSettings>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecoveryRepository for InMemoryRepository {
    async fn put_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(snapshot.assessment_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<RecoverySnapshot>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(assessment_id).cloned())
    }

    async fn delete_snapshot(&self, assessment_id: &AssessmentId) -> Result<bool, StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.remove(assessment_id).is_some())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn get_settings(&self) -> Result<Option<EngineSettings>, StorageError> {
        let guard = self
            .settings
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save_settings(&self, settings: &EngineSettings) -> Result<(), StorageError> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(settings.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub recovery: Arc<dyn RecoveryRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let recovery: Arc<dyn RecoveryRepository> = Arc::new(repo.clone());
        let settings: Arc<dyn SettingsRepository> = Arc::new(repo);
        Self { recovery, settings }
    }
}
