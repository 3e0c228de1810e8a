#![forbid(unsafe_code)]

pub mod error;
pub mod recovery;
pub mod sessions;
pub mod settings_service;
pub mod submission;

pub use exam_core::Clock;
pub use sessions as session;

pub use error::{SessionError, SettingsServiceError, SubmissionError, TransitionRejected};
pub use recovery::{RecoveryStore, RecoveryWriter, SavePolicy, SaveTrigger};
pub use settings_service::SettingsService;
pub use submission::{HttpSubmissionClient, SubmissionPayload, SubmissionReceipt, SubmissionService};

pub use sessions::{
    PartAdvance, RecoveryChoice, RecoveryPrompt, RecoveryResolution, SessionCommand,
    SessionController, SessionDeps, SessionEvent, SessionRunner, StartOutcome, SubmissionTicket,
    TickOutcome,
};
