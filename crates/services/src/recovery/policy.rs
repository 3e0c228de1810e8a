use chrono::{DateTime, Duration, Utc};

/// Why a save is being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// A phase, part, status, or answer change. Always saved.
    Transition,
    /// A plain tick. Saved at most once per interval.
    Interval,
}

/// Debounce for recovery saves.
#[derive(Debug, Clone)]
pub struct SavePolicy {
    interval: Duration,
    last_saved_at: Option<DateTime<Utc>>,
}

impl SavePolicy {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_saved_at: None,
        }
    }

    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    /// Decides whether to save now, and if so records `now` as the last save.
    pub fn should_save(&mut self, trigger: SaveTrigger, now: DateTime<Utc>) -> bool {
        let due = match (trigger, self.last_saved_at) {
            (SaveTrigger::Transition, _) | (SaveTrigger::Interval, None) => true,
            (SaveTrigger::Interval, Some(last)) => now - last >= self.interval,
        };
        if due {
            self.last_saved_at = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_saved_at = None;
    }
}
