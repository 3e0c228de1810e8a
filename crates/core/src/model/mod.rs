mod assessment;
mod ids;
mod part;
mod question;
mod session;
mod settings;
mod snapshot;

pub use assessment::{
    AssessmentDefinition, AssessmentDraft, AssessmentError, AssessmentKind, PartDefinition,
    QuestionDefinition,
};
pub use ids::{AssessmentId, IdError, PartNumber, QuestionId};
pub use part::PartRecord;
pub use question::{
    AnswerMetrics, AnswerPayload, MediaRef, PhaseTransition, QuestionPhase, QuestionRecord,
};
pub use session::{Countdown, Session, SessionMode, SessionStatus};
pub use settings::{
    DEFAULT_AUTOSAVE_INTERVAL_SECS, DEFAULT_SUBMISSION_TIMEOUT_SECS, DEFAULT_TICK_INTERVAL_MS,
    EngineSettings, EngineSettingsDraft, SettingsError,
};
pub use snapshot::RecoverySnapshot;
