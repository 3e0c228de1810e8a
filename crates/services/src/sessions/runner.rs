//! Event loop around a `SessionController`.
//!
//! One task owns the controller. It ticks on a fixed interval, applies UI
//! commands between ticks, and runs submissions off to the side so ticks keep
//! arriving (and are ignored) while one is in flight.

use std::future;
use std::time::Duration;

use exam_core::model::{AnswerPayload, PartNumber, QuestionId, QuestionPhase, SessionStatus};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::controller::SessionController;
use super::outcome::TickOutcome;
use crate::error::{SessionError, SubmissionError};
use crate::submission::SubmissionReceipt;

type SubmissionTask = JoinHandle<Result<SubmissionReceipt, SubmissionError>>;

/// Input from the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Answer {
        question: QuestionId,
        payload: AnswerPayload,
    },
    Phase {
        question: QuestionId,
        phase: QuestionPhase,
    },
    ReRecord(QuestionId),
    BeginQuestion(QuestionId),
    GoTo(PartNumber),
    Submit,
    /// Leaving the exam view.
    Leave,
}

/// Output for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Ticked(TickOutcome),
    Accepted(SessionCommand),
    Rejected {
        command: SessionCommand,
        reason: String,
    },
    SubmissionStarted,
    Submitted(SubmissionReceipt),
    SubmissionFailed(String),
    Left,
}

pub struct SessionRunner {
    controller: SessionController,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
    submission: Option<SubmissionTask>,
}

impl SessionRunner {
    /// Wraps a started controller. Returns the runner, the command sender and
    /// the event receiver.
    #[must_use]
    pub fn new(
        controller: SessionController,
        buffer: usize,
    ) -> (
        Self,
        mpsc::Sender<SessionCommand>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let runner = Self {
            controller,
            commands: command_rx,
            events: event_tx,
            submission: None,
        };
        (runner, command_tx, event_rx)
    }

    /// Drives the session until it completes, the user leaves, or the command
    /// channel closes. Hands the controller back.
    pub async fn run(mut self, tick_interval: Duration) -> SessionController {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            assessment_id = %self.controller.definition().id(),
            tick = ?tick_interval,
            "session runner started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.controller.now();
                    let outcome = self.controller.tick(now);
                    let due = outcome.submit_due;
                    if !outcome.suspended {
                        self.emit(SessionEvent::Ticked(outcome)).await;
                    }
                    if due {
                        self.start_submission().await;
                    }
                }

                joined = settle(&mut self.submission) => {
                    self.submission = None;
                    self.finish_submission(joined).await;
                }

                command = self.commands.recv() => {
                    match command {
                        None | Some(SessionCommand::Leave) => {
                            self.leave().await;
                            break;
                        }
                        Some(SessionCommand::Submit) => self.start_submission().await,
                        Some(command) => self.apply(command).await,
                    }
                }
            }

            if self.controller.status() == SessionStatus::Completed && self.submission.is_none() {
                debug!("session completed; runner stopping");
                break;
            }
        }
        self.controller
    }

    async fn apply(&mut self, command: SessionCommand) {
        let result = match &command {
            SessionCommand::Answer { question, payload } => {
                self.controller.set_answer(question, payload.clone())
            }
            SessionCommand::Phase { question, phase } => {
                self.controller.mark_phase(question, *phase).map(|_| ())
            }
            SessionCommand::ReRecord(question) => self.controller.re_record(question),
            SessionCommand::BeginQuestion(question) => {
                self.controller.begin_question(question).map(|_| ())
            }
            SessionCommand::GoTo(part) => self.controller.go_to(*part).map(|_| ()),
            SessionCommand::Submit | SessionCommand::Leave => Ok(()),
        };
        let event = match result {
            Ok(()) => SessionEvent::Accepted(command),
            Err(err) => SessionEvent::Rejected {
                command,
                reason: err.to_string(),
            },
        };
        self.emit(event).await;
    }

    async fn start_submission(&mut self) {
        if self.submission.is_some() {
            return;
        }
        let ticket = match self.controller.begin_submission() {
            Ok(ticket) => ticket,
            Err(SessionError::SubmissionInFlight) => return,
            Err(err) => {
                debug!(error = %err, "submission not started");
                return;
            }
        };
        let submitter = self.controller.submitter();
        self.submission = Some(tokio::spawn(async move {
            submitter.submit(ticket.payload()).await
        }));
        self.emit(SessionEvent::SubmissionStarted).await;
    }

    async fn finish_submission(
        &mut self,
        joined: Result<Result<SubmissionReceipt, SubmissionError>, JoinError>,
    ) {
        let result = joined.unwrap_or_else(|err| Err(SubmissionError::Unavailable(err.to_string())));
        let event = match self.controller.complete_submission(result).await {
            Ok(receipt) => SessionEvent::Submitted(receipt),
            Err(err) => SessionEvent::SubmissionFailed(err.to_string()),
        };
        self.emit(event).await;
    }

    async fn leave(&mut self) {
        if let Some(task) = self.submission.take() {
            let joined = task.await;
            self.finish_submission(joined).await;
        }
        self.controller.suspend();
        self.controller.flush_persistence().await;
        self.emit(SessionEvent::Left).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            warn!("session event receiver dropped");
        }
    }
}

async fn settle(task: &mut Option<SubmissionTask>) -> Result<Result<SubmissionReceipt, SubmissionError>, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => future::pending().await,
    }
}
