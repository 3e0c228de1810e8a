use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;

/// Lifecycle of a single question.
///
/// Speaking questions walk the full chain; writing questions usually jump from
/// `Pending` straight to `Answered` when the first text arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPhase {
    Pending,
    Preparing,
    Capturing,
    Answered,
    Submitted,
}

/// How a requested phase change relates to the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    /// Moves forward along the table.
    Advance,
    /// Already in the requested phase.
    Unchanged,
    /// Would move backwards or skip a mandatory step.
    Rejected,
}

impl QuestionPhase {
    /// Looks up `self -> next` in the transition table.
    #[must_use]
    pub fn transition_to(self, next: Self) -> PhaseTransition {
        use QuestionPhase::{Answered, Capturing, Pending, Preparing, Submitted};

        if self == next {
            return PhaseTransition::Unchanged;
        }
        match (self, next) {
            (Pending, Preparing | Capturing | Answered)
            | (Preparing, Capturing | Answered)
            | (Capturing, Answered)
            | (Answered, Submitted) => PhaseTransition::Advance,
            _ => PhaseTransition::Rejected,
        }
    }

    /// Whether a re-record may restart capture from this phase.
    #[must_use]
    pub fn allows_re_record(self) -> bool {
        matches!(self, QuestionPhase::Capturing | QuestionPhase::Answered)
    }

    #[must_use]
    pub fn is_answered(self) -> bool {
        matches!(self, QuestionPhase::Answered | QuestionPhase::Submitted)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionPhase::Pending => "pending",
            QuestionPhase::Preparing => "preparing",
            QuestionPhase::Capturing => "capturing",
            QuestionPhase::Answered => "answered",
            QuestionPhase::Submitted => "submitted",
        }
    }
}

/// Reference to captured media held by the capture widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub uri: String,
    pub duration_ms: u64,
}

/// An answer as reported by a capture widget. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerPayload {
    Text(String),
    Media(MediaRef),
}

/// Display-only figures derived from the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMetrics {
    pub word_count: u32,
    pub capture_duration_ms: u64,
}

impl AnswerMetrics {
    #[must_use]
    pub fn from_payload(payload: &AnswerPayload) -> Self {
        match payload {
            AnswerPayload::Text(text) => Self {
                word_count: u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX),
                capture_duration_ms: 0,
            },
            AnswerPayload::Media(media) => Self {
                word_count: 0,
                capture_duration_ms: media.duration_ms,
            },
        }
    }
}

/// Per-question state tracked by the answer ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub phase: QuestionPhase,
    #[serde(rename = "answerPayload")]
    pub answer: Option<AnswerPayload>,
    pub metrics: AnswerMetrics,
    /// End of the current prepare/response window, if the question is timed.
    #[serde(default)]
    pub phase_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prepare_ms: Option<u64>,
    #[serde(default)]
    pub response_ms: Option<u64>,
}

impl QuestionRecord {
    #[must_use]
    pub fn new(id: QuestionId, prepare_ms: Option<u64>, response_ms: Option<u64>) -> Self {
        Self {
            id,
            phase: QuestionPhase::Pending,
            answer: None,
            metrics: AnswerMetrics::default(),
            phase_deadline: None,
            prepare_ms,
            response_ms,
        }
    }
}
