//! ExamGuard CLI
//!
//! Usage:
//!   examguard serve --backend http://127.0.0.1:5000   # HTTP + WS API
//!   examguard replay session.jsonl                    # Replay an event script
//!   examguard replay session.jsonl --json             # JSON output

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use examguard::core::{
    run_server, DurationInput, EngineEvent, EngineServices, EngineSnapshot, ExamSetup,
    FileMarkerStore, FrameAnalyzer, MemoryMarkerStore, SessionEngine, SessionService,
    VoiceTelemetry,
};
use examguard::remote::{Backend, HttpFrameAnalyzer, HttpSessionService, HttpVoiceTelemetry};
use examguard::telemetry::init_tracing;
use examguard::types::{
    Answers, CloseSessionResponse, FrameAnalysis, SessionHandle, StartSessionResponse, UiCommand,
    VoiceEventKind,
};
use examguard::{EngineConfig, ServiceError, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "examguard",
    version = VERSION,
    about = "ExamGuard - integrity monitoring for unattended exam sessions",
    long_about = "ExamGuard turns camera, microphone and window-focus signals into a\n\
                  de-duplicated violation stream that escalates to forced submission.\n\n\
                  Commands:\n  \
                  serve   Run the HTTP + WebSocket API\n  \
                  replay  Feed a recorded JSONL event script through an engine"
)]
struct Args {
    /// Engine config file (JSON); missing fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP + WebSocket API
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,

        /// Proctoring backend origin
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        backend: String,

        /// Directory for fallback markers
        #[arg(long, default_value = "./markers")]
        marker_dir: PathBuf,
    },
    /// Replay a JSONL event script
    Replay {
        /// One engine event per line; blank lines and `#` comments are skipped
        file: PathBuf,

        /// Session id used for the replay
        #[arg(long, default_value = "replay")]
        session_id: String,

        /// Exam duration in minutes or H:MM:SS
        #[arg(long)]
        duration: Option<String>,

        /// Number of questions in the exam
        #[arg(long, default_value_t = 0)]
        total_questions: usize,

        /// Output as JSON lines
        #[arg(long)]
        json: bool,

        /// Disable colors in output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    let result = match args.command {
        Command::Serve {
            addr,
            backend,
            marker_dir,
        } => run_serve(&addr, &backend, marker_dir, config).await,
        Command::Replay {
            file,
            session_id,
            duration,
            total_questions,
            json,
            no_color,
        } => {
            let setup = ExamSetup {
                duration: duration.map(parse_duration_arg),
                total_questions,
                viewport: None,
            };
            run_replay(&file, &session_id, setup, config, json, no_color).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, examguard::ConfigError> {
    match path {
        Some(path) => {
            let config = EngineConfig::load_from(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Numbers are minutes, anything else goes through H:MM:SS parsing
fn parse_duration_arg(raw: String) -> DurationInput {
    match raw.parse::<f64>() {
        Ok(minutes) => DurationInput::Minutes(minutes),
        Err(_) => DurationInput::Text(raw),
    }
}

/// Run HTTP API server
async fn run_serve(
    addr: &str,
    backend: &str,
    marker_dir: PathBuf,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("{}", format!("ExamGuard API Server v{}", VERSION).bold());
    println!("  backend: {}", backend);
    println!("  markers: {}", marker_dir.display());
    println!();

    let backend = Backend::new(backend)?;
    let services = EngineServices {
        session: Arc::new(HttpSessionService::new(backend.clone())),
        telemetry: Arc::new(HttpVoiceTelemetry::new(backend.clone())),
        analyzer: Arc::new(HttpFrameAnalyzer::new(backend)),
        markers: Arc::new(FileMarkerStore::new(marker_dir)),
    };
    run_server(addr, config, services).await
}

/// Stand-in backend for replays: closes always succeed, nothing leaves the process
struct OfflineBackend;

#[async_trait]
impl SessionService for OfflineBackend {
    async fn start_session(
        &self,
        _auth_token: &str,
        exam_id: &str,
    ) -> Result<StartSessionResponse, ServiceError> {
        Ok(StartSessionResponse {
            success: true,
            session_id: Some(serde_json::Value::from(exam_id)),
            message: None,
        })
    }

    async fn close_session(
        &self,
        handle: &SessionHandle,
        answers: &Answers,
    ) -> Result<CloseSessionResponse, ServiceError> {
        info!(session_id = %handle.session_id, answers = answers.len(), "offline close");
        Ok(CloseSessionResponse {
            success: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl VoiceTelemetry for OfflineBackend {
    async fn report(
        &self,
        _session_id: &str,
        _rms: f64,
        _kind: VoiceEventKind,
        _duration: Option<f64>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[async_trait]
impl FrameAnalyzer for OfflineBackend {
    async fn analyze_frame(
        &self,
        _session_id: &str,
        _image: &[u8],
    ) -> Result<FrameAnalysis, ServiceError> {
        Err(ServiceError::Unavailable("no analyzer during replay".to_string()))
    }
}

/// Parse the script up front so a bad line fails before anything runs
fn read_script(path: &Path) -> Result<Vec<EngineEvent>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: EngineEvent = serde_json::from_str(line)
            .map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))?;
        events.push(event);
    }
    Ok(events)
}

/// Replay a recorded event script through a fresh engine
async fn run_replay(
    file: &Path,
    session_id: &str,
    setup: ExamSetup,
    config: EngineConfig,
    json: bool,
    no_color: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = read_script(file)?;
    let settle = Duration::from_millis(config.window_submit_delay_ms + 500);
    let offline = Arc::new(OfflineBackend);
    let services = EngineServices {
        session: offline.clone(),
        telemetry: offline.clone(),
        analyzer: offline,
        markers: Arc::new(MemoryMarkerStore::new()),
    };

    // No producers: timer ticks and signals come from the script
    let (engine, handle) = SessionEngine::new(
        config,
        Some(SessionHandle::new(session_id, "replay")),
        services,
        setup,
    )?;
    let mut commands = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match commands.recv().await {
                Ok(command) => print_command(&command, json, no_color),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "replay output lagging, commands skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let task = tokio::spawn(engine.run());

    if !json {
        print_header(file, events.len(), no_color);
    }
    for event in events {
        if handle.send(event).await.is_err() {
            break;
        }
    }

    // Let deferred submissions land, then stop
    let mut status = handle.snapshot_watch();
    let settled = matches!(
        tokio::time::timeout(settle, status.wait_for(|s| s.status.is_terminal())).await,
        Ok(Ok(_))
    );
    if !settled {
        handle.cancel();
    }
    let snapshot = task.await?;
    drop(handle);
    if let Err(e) = printer.await {
        warn!(error = %e, "printer task failed");
    }

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        print_summary(&snapshot, no_color);
    }
    Ok(())
}

fn print_header(file: &Path, events: usize, no_color: bool) {
    let line = format!("Replaying {} ({} events)", file.display(), events);
    if no_color {
        println!("{}", line);
    } else {
        println!("{}", line.bold());
    }
    println!();
}

fn print_command(command: &UiCommand, json: bool, no_color: bool) {
    if json {
        match serde_json::to_string(command) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "failed to encode ui command"),
        }
    } else if no_color {
        println!("{}", command.to_parseable_string());
    } else {
        println!("{}", command.to_terminal_string());
    }
}

fn print_summary(snapshot: &EngineSnapshot, no_color: bool) {
    let status = format!("{:?}", snapshot.status);
    let status = if no_color {
        status
    } else if snapshot.status.is_terminal() {
        status.green().bold().to_string()
    } else {
        status.yellow().to_string()
    };
    println!();
    println!("Session {}: {}", snapshot.session_id, status);
    println!(
        "  voice warnings: {} | window violations: {} | answered: {}/{}",
        snapshot.voice_warnings,
        snapshot.window_violations,
        snapshot.answered,
        snapshot.total_questions
    );
    println!(
        "  voice: {:?} (threshold {:.4}) | focus: {} | timer: {}",
        snapshot.vad_phase, snapshot.voice_threshold, snapshot.focus_state, snapshot.timer.text
    );
}
