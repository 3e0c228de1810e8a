use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{AssessmentDefinition, EngineSettingsDraft, SessionMode};
use services::{
    Clock, HttpSubmissionClient, RecoveryResolution, RecoveryStore, SessionCommand,
    SessionController, SessionDeps, SessionRunner, SettingsService, StartOutcome,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod console;

use console::{HELP, describe_event, describe_prompt, format_clock, parse_command, parse_recovery_choice};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingAssessment,
    UnknownArg(String),
    InvalidMode { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingAssessment => write!(f, "--assessment is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --assessment <file.json> [--mode timed|practice]");
    eprintln!("                      [--db <sqlite_url>] [--submit-url <url>] [--verbose]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --mode timed");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TOEIC_DB_URL, TOEIC_SUBMIT_URL, RUST_LOG");
}

#[derive(Debug)]
struct Args {
    db_url: String,
    assessment: PathBuf,
    mode: SessionMode,
    submit_url: Option<String>,
    verbose: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TOEIC_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url);
        let mut submit_url = std::env::var("TOEIC_SUBMIT_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let mut assessment = None;
        let mut mode = SessionMode::Timed;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--assessment" => {
                    assessment = Some(PathBuf::from(require_value(args, "--assessment")?));
                }
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    mode = match value.as_str() {
                        "timed" => SessionMode::Timed,
                        "practice" => SessionMode::Practice,
                        _ => return Err(ArgsError::InvalidMode { raw: value }),
                    };
                }
                "--submit-url" => {
                    submit_url = Some(require_value(args, "--submit-url")?);
                }
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            assessment: assessment.ok_or(ArgsError::MissingAssessment)?,
            mode,
            submit_url,
            verbose,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing(args.verbose);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    let settings_service = SettingsService::new(Arc::clone(&storage.settings));
    let mut settings = settings_service.load().await?;
    if let Some(url) = args.submit_url {
        settings = settings_service
            .save(EngineSettingsDraft {
                submission_base_url: Some(url),
                ..settings.to_draft()
            })
            .await?;
    }

    let raw = std::fs::read_to_string(&args.assessment)?;
    let definition: AssessmentDefinition = serde_json::from_str(&raw)?;
    info!(
        assessment_id = %definition.id(),
        parts = definition.parts().len(),
        questions = definition.question_count(),
        "assessment loaded"
    );

    let clock = Clock::system();
    let deps = SessionDeps {
        recovery: Arc::new(RecoveryStore::new(Arc::clone(&storage.recovery)).with_clock(clock)),
        submitter: Arc::new(HttpSubmissionClient::from_settings(&settings)?),
        settings: settings.clone(),
        clock,
    };
    let mut controller = SessionController::new(definition, args.mode, deps);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    if let StartOutcome::RecoveryAvailable(prompt) = controller.start().await? {
        loop {
            println!("{}", describe_prompt(&prompt));
            let Some(line) = stdin.next_line().await? else {
                return Ok(());
            };
            let Some(choice) = parse_recovery_choice(&line) else {
                continue;
            };
            match controller.resolve_recovery(choice).await? {
                RecoveryResolution::Resumed(_) | RecoveryResolution::Restarted => break,
                RecoveryResolution::Cancelled => {
                    println!("attempt kept; it can be resumed later");
                    return Ok(());
                }
            }
        }
    }

    println!(
        "{} ({}): part {}, {} left",
        controller.definition().title(),
        controller.mode().as_str(),
        controller.current_part(),
        format_clock(controller.remaining_ms())
    );
    println!("{HELP}");

    let tick = Duration::from_millis(settings.tick_interval_ms());
    let (runner, commands, mut events) = SessionRunner::new(controller, 32);
    let mut runner = tokio::spawn(runner.run(tick));
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            for line in describe_event(&event) {
                println!("{line}");
            }
        }
    });

    let mut input_open = true;
    let controller = loop {
        tokio::select! {
            joined = &mut runner => break joined?,
            line = stdin.next_line(), if input_open => {
                let command = match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => match parse_command(&line) {
                        Ok(command) => command,
                        Err(err) => {
                            eprintln!("{err}\n{HELP}");
                            continue;
                        }
                    },
                    None => {
                        input_open = false;
                        SessionCommand::Leave
                    }
                };
                // A closed channel means the runner is already finishing.
                let _ = commands.send(command).await;
            }
        }
    };
    drop(commands);
    printer.await?;

    info!(
        assessment_id = %controller.definition().id(),
        status = ?controller.status(),
        "session closed"
    );
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
