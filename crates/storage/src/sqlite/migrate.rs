use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates the recovery snapshot table and the single-row engine
/// settings table.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        // The payload is the full JSON snapshot; the other columns exist for
        // inspection and housekeeping queries.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS recovery_snapshots (
                    assessment_id TEXT PRIMARY KEY NOT NULL,
                    attempt_id TEXT NOT NULL,
                    mode TEXT NOT NULL CHECK (mode IN ('practice', 'timed')),
                    global_deadline TEXT,
                    captured_at TEXT NOT NULL,
                    payload TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS engine_settings (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    tick_interval_ms INTEGER NOT NULL CHECK (tick_interval_ms > 0),
                    autosave_interval_secs INTEGER NOT NULL CHECK (autosave_interval_secs > 0),
                    submission_base_url TEXT,
                    submission_timeout_secs INTEGER NOT NULL CHECK (submission_timeout_secs > 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_recovery_snapshots_deadline
                    ON recovery_snapshots (global_deadline);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
