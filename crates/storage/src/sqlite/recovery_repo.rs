use async_trait::async_trait;
use exam_core::model::{AssessmentId, RecoverySnapshot};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{RecoveryRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl RecoveryRepository for SqliteRepository {
    async fn put_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO recovery_snapshots (
                    assessment_id, attempt_id, mode, global_deadline, captured_at, payload
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(assessment_id) DO UPDATE SET
                    attempt_id = excluded.attempt_id,
                    mode = excluded.mode,
                    global_deadline = excluded.global_deadline,
                    captured_at = excluded.captured_at,
                    payload = excluded.payload
            ",
        )
        .bind(snapshot.assessment_id.as_str())
        .bind(snapshot.attempt_id.to_string())
        .bind(snapshot.mode.as_str())
        .bind(snapshot.global_deadline)
        .bind(snapshot.captured_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_snapshot(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<RecoverySnapshot>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload
                FROM recovery_snapshots
                WHERE assessment_id = ?1
            ",
        )
        .bind(assessment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload").map_err(ser)?;
        serde_json::from_str(&payload).map(Some).map_err(ser)
    }

    async fn delete_snapshot(&self, assessment_id: &AssessmentId) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM recovery_snapshots WHERE assessment_id = ?1")
            .bind(assessment_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(res.rows_affected() > 0)
    }
}
