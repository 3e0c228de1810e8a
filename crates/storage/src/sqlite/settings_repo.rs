use async_trait::async_trait;
use sqlx::Row;

use crate::repository::{SettingsRepository, StorageError};
use exam_core::model::{EngineSettings, EngineSettingsDraft};

use super::SqliteRepository;

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

#[async_trait]
impl SettingsRepository for SqliteRepository {
    async fn get_settings(&self) -> Result<Option<EngineSettings>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                tick_interval_ms,
                autosave_interval_secs,
                submission_base_url,
                submission_timeout_secs
            FROM engine_settings
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tick_interval_ms: i64 = row
            .try_get("tick_interval_ms")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let autosave_interval_secs: i64 = row
            .try_get("autosave_interval_secs")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let submission_base_url: Option<String> = row
            .try_get("submission_base_url")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let submission_timeout_secs: i64 = row
            .try_get("submission_timeout_secs")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        EngineSettings::from_persisted(EngineSettingsDraft {
            tick_interval_ms: Some(u64_from_i64("tick_interval_ms", tick_interval_ms)?),
            autosave_interval_secs: Some(u64_from_i64(
                "autosave_interval_secs",
                autosave_interval_secs,
            )?),
            submission_base_url,
            submission_timeout_secs: Some(u64_from_i64(
                "submission_timeout_secs",
                submission_timeout_secs,
            )?),
        })
        .map(Some)
        .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn save_settings(&self, settings: &EngineSettings) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO engine_settings (
                id,
                tick_interval_ms,
                autosave_interval_secs,
                submission_base_url,
                submission_timeout_secs
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                tick_interval_ms = excluded.tick_interval_ms,
                autosave_interval_secs = excluded.autosave_interval_secs,
                submission_base_url = excluded.submission_base_url,
                submission_timeout_secs = excluded.submission_timeout_secs
            ",
        )
        .bind(1_i64)
        .bind(i64_from_u64("tick_interval_ms", settings.tick_interval_ms())?)
        .bind(i64_from_u64(
            "autosave_interval_secs",
            settings.autosave_interval_secs(),
        )?)
        .bind(settings.submission_base_url())
        .bind(i64_from_u64(
            "submission_timeout_secs",
            settings.submission_timeout_secs(),
        )?)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
