#![forbid(unsafe_code)]

pub mod ledger;
pub mod model;
pub mod navigator;
pub mod time;
pub mod timer;

pub use ledger::{AnswerLedger, DrainedAnswer, LedgerError, Progress, QuestionTimerEvent};
pub use navigator::{NavigationError, PartExpiry, PartNavigator};
pub use time::Clock;
pub use timer::{TimerEngine, TimerTick};
