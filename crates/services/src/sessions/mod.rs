mod controller;
mod outcome;
mod runner;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{SessionController, SessionDeps, SubmissionTicket};
pub use outcome::{
    PartAdvance, RecoveryChoice, RecoveryPrompt, RecoveryResolution, StartOutcome, TickOutcome,
};
pub use runner::{SessionCommand, SessionEvent, SessionRunner};
