use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use bookvox_app::{runtime, Settings};
use bookvox_backend::BackendClient;
use bookvox_foundation::{AppError, AppState, ShutdownGuard, ShutdownHandler, StateManager};
use bookvox_jobs::JobId;

#[derive(Parser)]
#[command(name = "bookvox")]
#[command(version)]
#[command(about = "Voice-to-book client")]
#[command(
    long_about = "Submit a spoken book request, follow the backend job that identifies and \
converts it, and listen to the converted book sentence by sentence."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL
    #[arg(long, global = true, env = "BOOKVOX_API_URL")]
    api_url: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a recorded voice query and follow the job it opens
    Ask {
        /// Audio file to upload (e.g. recording.webm)
        audio_file: PathBuf,
    },
    /// Follow an existing job until it settles
    Watch { job_id: String },
    /// Answer a clarifying question, then follow the fresh guess
    Clarify { job_id: String, answer: String },
    /// Ask the backend to acquire and convert the guessed book
    Fetch { job_id: String },
    /// List the sections of the converted book
    Sections { job_id: String },
    /// Read a converted section aloud
    Read {
        job_id: String,
        /// Section file name; defaults to the first section
        #[arg(long)]
        section: Option<String>,
    },
    /// Read a local text file aloud
    Speak { text_file: PathBuf },
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "bookvox.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    // Logs go to stderr; stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;
    let cli = Cli::parse();

    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;

    let mut settings = match cli.config.as_deref() {
        Some(path) => Settings::from_path(path),
        None => Settings::new(),
    }
    .map_err(AppError::Config)?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    tracing::debug!(target: "app", api_url = %settings.api_url, "configuration loaded");

    let client = Arc::new(BackendClient::new(&settings.api_url)?);
    state_manager.transition(AppState::Running)?;

    let result = run_command(cli.command, &client, &settings, &shutdown).await;

    state_manager.transition(AppState::Stopping)?;
    state_manager.transition(AppState::Stopped)?;

    if let Err(error) = &result {
        tracing::error!(target: "app", error = %error, "command failed");
    }
    result.map_err(Into::into)
}

async fn run_command(
    command: Commands,
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
) -> anyhow::Result<()> {
    match command {
        Commands::Ask { audio_file } => {
            runtime::run_ask(client, settings, shutdown, &audio_file).await
        }
        Commands::Watch { job_id } => {
            runtime::run_watch(client, settings, shutdown, parse_job_id(&job_id)?).await
        }
        Commands::Clarify { job_id, answer } => {
            runtime::run_clarify(client, settings, shutdown, parse_job_id(&job_id)?, &answer).await
        }
        Commands::Fetch { job_id } => {
            runtime::run_fetch(client, settings, shutdown, parse_job_id(&job_id)?).await
        }
        Commands::Sections { job_id } => {
            runtime::run_sections(client, shutdown, parse_job_id(&job_id)?).await
        }
        Commands::Read { job_id, section } => {
            runtime::run_read(client, settings, shutdown, parse_job_id(&job_id)?, section).await
        }
        Commands::Speak { text_file } => {
            runtime::run_speak(client, settings, shutdown, &text_file).await
        }
    }
}

fn parse_job_id(raw: &str) -> anyhow::Result<JobId> {
    JobId::new(raw)
        .ok_or_else(|| AppError::InvalidInput("job id must not be empty".to_string()).into())
}
