use exam_core::QuestionTimerEvent;
use exam_core::model::PartNumber;

/// One forced part transition observed during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartAdvance {
    pub from: PartNumber,
    pub to: PartNumber,
}

/// Everything a tick changed, for the view layer to render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Global remaining time after the tick.
    pub remaining_ms: u64,
    /// Part advances in ascending order, one per expired part.
    pub advanced: Vec<PartAdvance>,
    pub question_events: Vec<QuestionTimerEvent>,
    /// The practice budget ran out on this tick.
    pub budget_exhausted: bool,
    /// The global deadline was reached on this tick.
    pub expired: bool,
    /// A submission should be started now.
    pub submit_due: bool,
    /// The tick was ignored (submission in flight or session not running).
    pub suspended: bool,
    /// A snapshot was queued for persistence.
    pub persisted: bool,
}

impl TickOutcome {
    pub(crate) fn suspended(remaining_ms: u64) -> Self {
        Self {
            remaining_ms,
            suspended: true,
            ..Self::default()
        }
    }
}

/// Summary shown when an unfinished attempt can be resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPrompt {
    pub test_title: String,
    pub progress_percent: u8,
    pub time_remaining_ms: u64,
    pub answered_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Fresh,
    RecoveryAvailable(RecoveryPrompt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// Resume the stored attempt.
    Continue,
    /// Discard it and start over.
    Restart,
    /// Decide later; the stored attempt is kept.
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryResolution {
    Resumed(TickOutcome),
    Restarted,
    Cancelled,
}
