use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{AssessmentId, PartNumber, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("assessment title cannot be empty")]
    EmptyTitle,

    #[error("assessment must contain at least one part")]
    NoParts,

    #[error("part numbers must ascend from 1 without gaps (expected {expected}, found {found})")]
    PartOrder { expected: u32, found: u32 },

    #[error("part {part} has no questions")]
    EmptyPart { part: PartNumber },

    #[error("part {part} time limit must be > 0")]
    InvalidTimeLimit { part: PartNumber },

    #[error("question {id} appears more than once")]
    DuplicateQuestion { id: QuestionId },

    #[error("total duration must be > 0")]
    InvalidTotalDuration,
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Which half of the TOEIC Speaking & Writing test an assessment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Speaking,
    Writing,
}

/// One question slot. Speaking questions usually carry a preparation window
/// followed by a response window; writing questions carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDefinition {
    pub id: QuestionId,
    #[serde(default)]
    pub prepare_ms: Option<u64>,
    #[serde(default)]
    pub response_ms: Option<u64>,
}

impl QuestionDefinition {
    #[must_use]
    pub fn untimed(id: QuestionId) -> Self {
        Self {
            id,
            prepare_ms: None,
            response_ms: None,
        }
    }

    #[must_use]
    pub fn timed(id: QuestionId, prepare_ms: u64, response_ms: u64) -> Self {
        Self {
            id,
            prepare_ms: Some(prepare_ms),
            response_ms: Some(response_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDefinition {
    pub part_number: PartNumber,
    pub time_limit_ms: u64,
    pub questions: Vec<QuestionDefinition>,
}

/// Unvalidated wire shape of an assessment definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDraft {
    pub id: AssessmentId,
    pub title: String,
    pub kind: AssessmentKind,
    pub parts: Vec<PartDefinition>,
    #[serde(default)]
    pub total_duration_ms: Option<u64>,
}

/// A validated Speaking or Writing test definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AssessmentDraft")]
pub struct AssessmentDefinition {
    id: AssessmentId,
    title: String,
    kind: AssessmentKind,
    parts: Vec<PartDefinition>,
    total_duration_ms: Option<u64>,
}

impl AssessmentDefinition {
    /// Validates a draft into a definition.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError` if the title is blank, parts are missing,
    /// misnumbered, empty, or untimed, or a question id repeats.
    pub fn new(draft: AssessmentDraft) -> Result<Self, AssessmentError> {
        let title = draft.title.trim().to_owned();
        if title.is_empty() {
            return Err(AssessmentError::EmptyTitle);
        }
        if draft.parts.is_empty() {
            return Err(AssessmentError::NoParts);
        }
        if draft.total_duration_ms == Some(0) {
            return Err(AssessmentError::InvalidTotalDuration);
        }

        let mut seen = HashSet::new();
        for (index, part) in draft.parts.iter().enumerate() {
            let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if part.part_number.value() != expected {
                return Err(AssessmentError::PartOrder {
                    expected,
                    found: part.part_number.value(),
                });
            }
            if part.questions.is_empty() {
                return Err(AssessmentError::EmptyPart {
                    part: part.part_number,
                });
            }
            if part.time_limit_ms == 0 {
                return Err(AssessmentError::InvalidTimeLimit {
                    part: part.part_number,
                });
            }
            for question in &part.questions {
                if !seen.insert(question.id.clone()) {
                    return Err(AssessmentError::DuplicateQuestion {
                        id: question.id.clone(),
                    });
                }
            }
        }

        Ok(Self {
            id: draft.id,
            title,
            kind: draft.kind,
            parts: draft.parts,
            total_duration_ms: draft.total_duration_ms,
        })
    }

    #[must_use]
    pub fn id(&self) -> &AssessmentId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> AssessmentKind {
        self.kind
    }

    #[must_use]
    pub fn parts(&self) -> &[PartDefinition] {
        &self.parts
    }

    /// Overall session length: the explicit total if one was given, else the
    /// sum of part limits.
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms.unwrap_or_else(|| {
            self.parts
                .iter()
                .fold(0_u64, |acc, part| acc.saturating_add(part.time_limit_ms))
        })
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.parts.iter().map(|part| part.questions.len()).sum()
    }
}

impl TryFrom<AssessmentDraft> for AssessmentDefinition {
    type Error = AssessmentError;

    fn try_from(draft: AssessmentDraft) -> Result<Self, Self::Error> {
        Self::new(draft)
    }
}
