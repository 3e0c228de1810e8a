//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::SettingsError;
use exam_core::{LedgerError, NavigationError};
use storage::repository::StorageError;

/// Errors emitted by `SubmissionService` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("submission endpoint is not configured")]
    Disabled,
    #[error("submission request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("submission service unavailable: {0}")]
    Unavailable(String),
}

/// A call the engine refused. Nothing changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionRejected {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Errors emitted by the session controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session has not started")]
    NotStarted,
    #[error("session already started")]
    AlreadyStarted,
    #[error("session is not accepting changes")]
    NotActive,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("no recovery snapshot is waiting for a decision")]
    NoPendingRecovery,
    #[error("recovery snapshot is stale or belongs to another assessment")]
    StaleSnapshot,
    #[error("rejected: {0}")]
    Rejected(#[from] TransitionRejected),
    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SettingsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsServiceError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
