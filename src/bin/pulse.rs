//! Pulse CLI - Command-line interface for Study Pulse
//!
//! Commands:
//! - track: Record a single behavioral event
//! - mood: Record a mood check-in
//! - import: Load a batch of events (NDJSON or JSON array)
//! - insights: Generate (or show cached) insights for a learner
//! - report: Print the full insight report
//! - dismiss: Hide an insight, or restore all hidden insights
//! - prune: Apply the retention window
//! - reset: Forget everything stored for a learner
//! - doctor: Diagnose configuration and storage health

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use study_pulse::store::{FileStore, KeyValueStore};
use study_pulse::types::{EventMetadata, EventType, Insight, MoodEntry, MoodLabel, NewEvent};
use study_pulse::{logging, InsightError, InsightProcessor, PulseConfig};
use study_pulse::{PRODUCER_NAME, PULSE_VERSION};

/// Pulse - On-device learning engagement insights
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author = "Synheart AI Inc")]
#[command(version = PULSE_VERSION)]
#[command(about = "Track learning activity and generate engagement insights", long_about = None)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/study-pulse/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the learner's UTC offset in minutes
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Evaluate as of this RFC 3339 instant instead of the current time
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a single behavioral event
    Track {
        /// Learner ID
        #[arg(short, long)]
        user: String,

        /// Event type (e.g. quiz_attempt, page_view)
        #[arg(short = 't', long = "type")]
        event_type: EventType,

        /// Event time (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Quiz score (0-100)
        #[arg(long)]
        score: Option<f64>,

        /// Subject the event relates to
        #[arg(long)]
        subject: Option<String>,

        /// Session length in seconds (session_end only)
        #[arg(long)]
        duration: Option<u64>,

        /// Extra metadata as key=value (value parsed as JSON when possible)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Record a mood check-in
    Mood {
        /// Learner ID
        #[arg(short, long)]
        user: String,

        /// Mood label (excited, happy, okay, tired, frustrated, confused, sad)
        #[arg(short, long)]
        mood: String,

        /// Energy level (1-5)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        energy: Option<u8>,

        /// Confidence level (1-5)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        confidence: Option<u8>,

        /// Free-form note
        #[arg(long)]
        note: Option<String>,

        /// Check-in time (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Load a batch of events
    Import {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Generate insights for a learner
    Insights {
        /// Learner ID
        #[arg(short, long)]
        user: String,

        /// Show the last generated set instead of generating
        #[arg(long)]
        cached: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Print the full insight report
    Report {
        /// Learner ID
        #[arg(short, long)]
        user: String,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Hide an insight from future results
    Dismiss {
        /// Learner ID
        #[arg(short, long)]
        user: String,

        /// Insight ID to dismiss
        #[arg(long, required_unless_present = "restore")]
        id: Option<String>,

        /// Restore all dismissed insights instead
        #[arg(long, conflicts_with = "id")]
        restore: bool,
    },

    /// Remove events older than the retention window
    Prune {
        /// Learner ID
        #[arg(short, long)]
        user: String,
    },

    /// Forget everything stored for a learner
    Reset {
        /// Learner ID
        #[arg(short, long)]
        user: String,
    },

    /// Diagnose configuration and storage health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one insight per line)
    Ndjson,
    /// JSON array of insights
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    let config = load_config(&cli)?;
    logging::init(&config.logging)?;

    let now = cli.now.unwrap_or_else(Utc::now);

    if let Commands::Doctor { json } = cli.command {
        return cmd_doctor(&cli_config_path(&cli), &config, json);
    }

    let processor = InsightProcessor::from_config(&config)?;

    match cli.command {
        Commands::Track {
            user,
            event_type,
            at,
            score,
            subject,
            duration,
            meta,
        } => {
            let mut metadata = parse_meta(&meta)?;
            if let Some(score) = score {
                metadata = metadata.with_score(score);
            }
            if let Some(subject) = subject {
                metadata = metadata.with_subject(&subject);
            }
            cmd_track(
                &processor,
                NewEvent {
                    user_id: user,
                    event_type,
                    timestamp: at.unwrap_or(now),
                    metadata,
                    duration,
                },
            )
        }

        Commands::Mood {
            user,
            mood,
            energy,
            confidence,
            note,
            at,
        } => {
            let entry = MoodEntry {
                timestamp: at.unwrap_or(now),
                mood: MoodLabel::parse(&mood),
                energy,
                confidence,
                note,
            };
            let event = processor.track_mood(&user, entry)?;
            println!("{}", serde_json::to_string(&event)?);
            Ok(())
        }

        Commands::Import {
            input,
            input_format,
        } => cmd_import(&processor, &input, input_format),

        Commands::Insights {
            user,
            cached,
            output_format,
        } => {
            let insights = if cached {
                processor.cached_insights(&user)
            } else {
                processor.generate_insights(&user, now)
            };
            print!("{}", format_insights(&insights, &output_format)?);
            Ok(())
        }

        Commands::Report { user, output } => {
            let report = processor.report(&user, now)?;
            if output.to_string_lossy() == "-" {
                println!("{}", report);
            } else {
                fs::write(output, report)?;
            }
            Ok(())
        }

        Commands::Dismiss { user, id, restore } => {
            if restore {
                processor.restore_insights(&user);
                eprintln!("Restored dismissed insights for {}", user);
            } else if let Some(id) = id {
                if processor.dismiss_insight(&user, &id) {
                    eprintln!("Dismissed {} for {}", id, user);
                } else {
                    eprintln!("{} was already dismissed for {}", id, user);
                }
            }
            Ok(())
        }

        Commands::Prune { user } => {
            let removed = processor.prune_user(&user, now);
            println!(
                "{}",
                serde_json::json!({
                    "user_id": user,
                    "removed": removed,
                    "retention_days": processor.retention_days(),
                })
            );
            Ok(())
        }

        Commands::Reset { user } => {
            processor.reset(&user);
            eprintln!("Reset all stored state for {}", user);
            Ok(())
        }

        Commands::Doctor { .. } => Ok(()),
    }
}

fn cli_config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(PulseConfig::config_path)
}

fn load_config(cli: &Cli) -> Result<PulseConfig, PulseCliError> {
    let mut config = match &cli.config {
        Some(path) => PulseConfig::load_from(path)?,
        None => PulseConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(offset) = cli.utc_offset {
        config.utc_offset_minutes = offset;
    }
    config.validate()?;
    Ok(config)
}

/// Parse `key=value` pairs; values that are valid JSON keep their type
fn parse_meta(pairs: &[String]) -> Result<EventMetadata, PulseCliError> {
    let mut metadata = EventMetadata::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            PulseCliError::InvalidArgument(format!("expected KEY=VALUE, got {:?}", pair))
        })?;
        let value = serde_json::from_str::<serde_json::Value>(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        metadata = metadata.with(key, value);
    }
    Ok(metadata)
}

fn cmd_track(processor: &InsightProcessor, event: NewEvent) -> Result<(), PulseCliError> {
    let event = processor.track_event(event)?;
    println!("{}", serde_json::to_string(&event)?);
    Ok(())
}

fn cmd_import(
    processor: &InsightProcessor,
    input: &Path,
    input_format: InputFormat,
) -> Result<(), PulseCliError> {
    // Read input
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    // NDJSON lines are already JSON values; join them into an array
    let events_json = match input_format {
        InputFormat::Json => input_data,
        InputFormat::Ndjson => {
            let lines: Vec<&str> = input_data
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            format!("[{}]", lines.join(","))
        }
    };

    let count = processor.import_events(&events_json)?;
    if count == 0 {
        return Err(PulseCliError::NoEvents);
    }

    println!("{}", serde_json::json!({ "imported": count }));
    Ok(())
}

fn format_insights(insights: &[Insight], format: &OutputFormat) -> Result<String, PulseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for insight in insights {
                output.push_str(&serde_json::to_string(insight)?);
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string(insights)?)),
        OutputFormat::JsonPretty => Ok(format!("{}\n", serde_json::to_string_pretty(insights)?)),
    }
}

fn cmd_doctor(config_path: &Path, config: &PulseConfig, json: bool) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pulse version {}", PULSE_VERSION),
    });

    // Config file
    checks.push(if config_path.exists() {
        DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Loaded {}", config_path.display()),
        }
    } else {
        DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} not found, using defaults", config_path.display()),
        }
    });

    checks.push(DoctorCheck {
        name: "settings".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "retention {} days, cap {} events/user, UTC offset {} min",
            config.retention_days, config.max_events_per_user, config.utc_offset_minutes
        ),
    });

    // Data directory must accept a write
    let data_dir = config.data_dir();
    let storage = FileStore::open(&data_dir).and_then(|store| {
        store.save("doctor:probe", "{}")?;
        store.remove("doctor:probe")
    });
    checks.push(match storage {
        Ok(()) => DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is writable", data_dir.display()),
        },
        Err(e) => DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Error,
            message: format!("{} is not usable: {}", data_dir.display(), e),
        },
    });

    // Check stdin is available (for piped imports)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (import - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Pulse(InsightError),
    Json(serde_json::Error),
    InvalidArgument(String),
    NoEvents,
    DoctorFailed,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<InsightError> for PulseCliError {
    fn from(e: InsightError) -> Self {
        PulseCliError::Pulse(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Pulse(e) => {
                let (code, hint) = match &e {
                    InsightError::ParseError(_) | InsightError::JsonError(_) => {
                        ("PARSE_ERROR", "Check JSON syntax and event fields")
                    }
                    InsightError::InvalidEvent(_) => {
                        ("INVALID_EVENT", "Events need a user_id; duration is only valid on session_end")
                    }
                    InsightError::Storage(_) => {
                        ("STORAGE_ERROR", "Run 'pulse doctor' to check the data directory")
                    }
                    InsightError::Config(_) => ("CONFIG_ERROR", "Check config.toml values"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Run with --help for usage".to_string()),
            },
            PulseCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
