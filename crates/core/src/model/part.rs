use serde::{Deserialize, Serialize};

use crate::model::assessment::PartDefinition;
use crate::model::ids::{PartNumber, QuestionId};
use crate::model::question::QuestionRecord;

/// One timed section of a session.
///
/// Once `locked` is set it stays set; the ledger refuses to touch the questions
/// of a locked part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    part_number: PartNumber,
    time_limit_ms: u64,
    time_left_ms: u64,
    locked: bool,
    questions: Vec<QuestionRecord>,
}

impl PartRecord {
    #[must_use]
    pub fn from_definition(def: &PartDefinition) -> Self {
        Self {
            part_number: def.part_number,
            time_limit_ms: def.time_limit_ms,
            time_left_ms: def.time_limit_ms,
            locked: false,
            questions: def
                .questions
                .iter()
                .map(|q| QuestionRecord::new(q.id.clone(), q.prepare_ms, q.response_ms))
                .collect(),
        }
    }

    #[must_use]
    pub fn part_number(&self) -> PartNumber {
        self.part_number
    }

    #[must_use]
    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit_ms
    }

    #[must_use]
    pub fn time_left_ms(&self) -> u64 {
        self.time_left_ms
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionRecord] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&QuestionRecord> {
        self.questions.iter().find(|q| &q.id == id)
    }

    pub(crate) fn question_mut(&mut self, id: &QuestionId) -> Option<&mut QuestionRecord> {
        self.questions.iter_mut().find(|q| &q.id == id)
    }

    pub(crate) fn questions_mut(&mut self) -> impl Iterator<Item = &mut QuestionRecord> {
        self.questions.iter_mut()
    }

    /// Sets the remaining time, capped at the part's limit. Locked parts stay at zero.
    pub fn set_time_left_ms(&mut self, left_ms: u64) {
        if self.locked {
            return;
        }
        self.time_left_ms = left_ms.min(self.time_limit_ms);
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
        self.time_left_ms = 0;
    }
}
