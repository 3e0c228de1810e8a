//! Line-oriented stand-in for the exam view.

use std::fmt;

use exam_core::model::{AnswerPayload, MediaRef, PartNumber, QuestionId, QuestionPhase};
use services::{RecoveryChoice, RecoveryPrompt, SessionCommand, SessionEvent, TickOutcome};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidArgument { name: &'static str, raw: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ParseError::MissingArgument(name) => write!(f, "missing <{name}>"),
            ParseError::InvalidArgument { name, raw } => write!(f, "invalid <{name}>: {raw}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
commands:
  answer <question> <text...>
  media <question> <uri> <duration_ms>
  begin <question>
  phase <question> <pending|preparing|capturing|answered>
  rerecord <question>
  goto <part>
  submit
  quit";

pub fn parse_command(line: &str) -> Result<SessionCommand, ParseError> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let mut words = rest.split_whitespace();

    match head {
        "" => Err(ParseError::Empty),
        "answer" => {
            let question = question(words.next())?;
            let text = rest
                .split_once(char::is_whitespace)
                .map(|(_, text)| text.trim())
                .filter(|text| !text.is_empty())
                .ok_or(ParseError::MissingArgument("text"))?;
            Ok(SessionCommand::Answer {
                question,
                payload: AnswerPayload::Text(text.to_owned()),
            })
        }
        "media" => {
            let question = question(words.next())?;
            let uri = words.next().ok_or(ParseError::MissingArgument("uri"))?;
            let raw = words
                .next()
                .ok_or(ParseError::MissingArgument("duration_ms"))?;
            let duration_ms = raw.parse().map_err(|_| ParseError::InvalidArgument {
                name: "duration_ms",
                raw: raw.to_owned(),
            })?;
            Ok(SessionCommand::Answer {
                question,
                payload: AnswerPayload::Media(MediaRef {
                    uri: uri.to_owned(),
                    duration_ms,
                }),
            })
        }
        "begin" => Ok(SessionCommand::BeginQuestion(question(words.next())?)),
        "rerecord" => Ok(SessionCommand::ReRecord(question(words.next())?)),
        "phase" => {
            let question = question(words.next())?;
            let raw = words.next().ok_or(ParseError::MissingArgument("phase"))?;
            Ok(SessionCommand::Phase {
                question,
                phase: phase(raw)?,
            })
        }
        "goto" => {
            let raw = words.next().ok_or(ParseError::MissingArgument("part"))?;
            let number: u32 = raw.parse().map_err(|_| ParseError::InvalidArgument {
                name: "part",
                raw: raw.to_owned(),
            })?;
            Ok(SessionCommand::GoTo(PartNumber::new(number)))
        }
        "submit" => Ok(SessionCommand::Submit),
        "quit" | "leave" => Ok(SessionCommand::Leave),
        other => Err(ParseError::UnknownCommand(other.to_owned())),
    }
}

fn question(raw: Option<&str>) -> Result<QuestionId, ParseError> {
    let raw = raw.ok_or(ParseError::MissingArgument("question"))?;
    QuestionId::new(raw).map_err(|_| ParseError::InvalidArgument {
        name: "question",
        raw: raw.to_owned(),
    })
}

fn phase(raw: &str) -> Result<QuestionPhase, ParseError> {
    match raw {
        "pending" => Ok(QuestionPhase::Pending),
        "preparing" => Ok(QuestionPhase::Preparing),
        "capturing" => Ok(QuestionPhase::Capturing),
        "answered" => Ok(QuestionPhase::Answered),
        _ => Err(ParseError::InvalidArgument {
            name: "phase",
            raw: raw.to_owned(),
        }),
    }
}

pub fn parse_recovery_choice(line: &str) -> Option<RecoveryChoice> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" | "continue" => Some(RecoveryChoice::Continue),
        "r" | "restart" => Some(RecoveryChoice::Restart),
        "x" | "cancel" => Some(RecoveryChoice::Cancel),
        _ => None,
    }
}

pub fn format_clock(ms: u64) -> String {
    let secs = ms / 1_000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn describe_prompt(prompt: &RecoveryPrompt) -> String {
    format!(
        "Unfinished attempt of \"{}\": {}/{} answered ({}%), {} left.\n[c]ontinue, [r]estart or cancel [x]?",
        prompt.test_title,
        prompt.answered_count,
        prompt.total_count,
        prompt.progress_percent,
        format_clock(prompt.time_remaining_ms),
    )
}

/// Human-readable lines for an event. Plain ticks print nothing.
pub fn describe_event(event: &SessionEvent) -> Vec<String> {
    match event {
        SessionEvent::Ticked(outcome) => describe_tick(outcome),
        SessionEvent::Accepted(_) => vec!["ok".into()],
        SessionEvent::Rejected { reason, .. } => vec![format!("rejected: {reason}")],
        SessionEvent::SubmissionStarted => vec!["submitting...".into()],
        SessionEvent::Submitted(receipt) => vec![format!("submitted, result {}", receipt.result_id)],
        SessionEvent::SubmissionFailed(reason) => {
            vec![format!("submission failed: {reason} (type `submit` to retry)")]
        }
        SessionEvent::Left => vec!["progress saved".into()],
    }
}

fn describe_tick(outcome: &TickOutcome) -> Vec<String> {
    let mut lines: Vec<String> = outcome
        .advanced
        .iter()
        .map(|advance| {
            format!(
                "part {} time is up; now on part {} ({} left)",
                advance.from,
                advance.to,
                format_clock(outcome.remaining_ms)
            )
        })
        .collect();
    lines.extend(outcome.question_events.iter().map(|event| format!("{event:?}")));
    if outcome.budget_exhausted {
        lines.push("practice time is up; keep going or submit".into());
    }
    if outcome.expired {
        lines.push("time is up".into());
    }
    lines
}
