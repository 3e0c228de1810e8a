use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::Clock;
use exam_core::model::{AssessmentId, RecoverySnapshot};
use storage::repository::{RecoveryRepository, StorageError};
use tracing::debug;

/// Validating front of the recovery repository.
///
/// The repository returns whatever was stored; this layer decides whether a
/// snapshot is still replayable and discards it when it is not.
#[derive(Clone)]
pub struct RecoveryStore {
    repo: Arc<dyn RecoveryRepository>,
    clock: Clock,
}

impl RecoveryStore {
    #[must_use]
    pub fn new(repo: Arc<dyn RecoveryRepository>) -> Self {
        Self {
            repo,
            clock: Clock::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Persist a snapshot, replacing any previous one for the same id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend write fails.
    pub async fn save(&self, snapshot: &RecoverySnapshot) -> Result<(), StorageError> {
        self.repo.put_snapshot(snapshot).await
    }

    /// Load a usable snapshot for `assessment_id` as of the store clock.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend read fails.
    pub async fn load(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<RecoverySnapshot>, StorageError> {
        self.load_at(assessment_id, self.clock.now()).await
    }

    /// Load a usable snapshot as of `now`.
    ///
    /// A stored snapshot whose id does not match, whose deadline has passed, or
    /// that belongs to a completed session is deleted and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend read fails.
    pub async fn load_at(
        &self,
        assessment_id: &AssessmentId,
        now: DateTime<Utc>,
    ) -> Result<Option<RecoverySnapshot>, StorageError> {
        let Some(snapshot) = self.repo.get_snapshot(assessment_id).await? else {
            return Ok(None);
        };
        if snapshot.is_usable_for(assessment_id, now) {
            return Ok(Some(snapshot));
        }

        debug!(
            assessment_id = %assessment_id,
            stored_id = %snapshot.assessment_id,
            deadline = ?snapshot.global_deadline,
            "discarding stale recovery snapshot"
        );
        // Best effort; a failed delete is retried by the next load.
        if let Err(err) = self.repo.delete_snapshot(assessment_id).await {
            debug!(assessment_id = %assessment_id, error = %err, "stale snapshot delete failed");
        }
        Ok(None)
    }

    /// Remove the snapshot for `assessment_id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend delete fails.
    pub async fn clear(&self, assessment_id: &AssessmentId) -> Result<bool, StorageError> {
        self.repo.delete_snapshot(assessment_id).await
    }
}
