//! Moments CLI: turn a local video into a highlight reel via the Moments API.
//!
//! Set MOMENTS_ENV (dev, staging, prod) and optionally API_BASE_URL.

use anyhow::Context;
use clap::{Parser, Subcommand};
use moments_client::{
    init_tracing, AppConfig, ClassifiedError, HttpTransport, JobSession, JobTransport,
    MediaSource, SessionPhase, SessionState, VideoConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "moments", about = "Moments highlight client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a video, wait for processing and download the highlight
    Process {
        /// Path to the video file
        file: PathBuf,
        /// Highlight length: quick (15s), standard (30s) or extended (60s)
        #[arg(long, default_value = "standard")]
        preset: String,
    },
    /// Print the current status of a job
    Status {
        /// Job id returned by the upload
        job_id: String,
    },
    /// Check that the backend is reachable
    Health,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn render(state: &SessionState) -> String {
    let percent = state.percent_text();
    if percent.is_empty() {
        state.status_message.clone()
    } else {
        format!("{:>4}  {}", percent, state.status_message)
    }
}

async fn process(config: &AppConfig, file: PathBuf, preset: &str) -> anyhow::Result<ExitCode> {
    let video = VideoConfig::preset(preset)
        .with_context(|| format!("Unknown preset '{}'", preset))?;
    let media = MediaSource::open(&file)
        .await
        .map_err(ClassifiedError::from)
        .with_context(|| format!("Cannot read {}", file.display()))?;

    let mut session = JobSession::from_config(config, video)?;
    let mut updates = session.subscribe();
    session.start(media);

    let mut last_line = String::new();
    let mut watch_interrupts = true;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                let line = render(&state);
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
                if !state.is_active() {
                    break;
                }
            }
            interrupted = tokio::signal::ctrl_c(), if watch_interrupts => match interrupted {
                Ok(()) => session.cancel(),
                Err(e) => {
                    tracing::warn!("Ctrl-C handling unavailable: {}", e);
                    watch_interrupts = false;
                }
            },
        }
    }

    let state = session.state();
    match state.phase {
        SessionPhase::Succeeded => {
            if let Some(path) = state.result_location() {
                println!("Highlight saved to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        SessionPhase::Cancelled => {
            println!("Cancelled");
            Ok(ExitCode::from(130))
        }
        _ => {
            if let Some(error) = &state.last_error {
                eprintln!("{}", error.friendly_message());
                tracing::debug!("Session failed: {}", error);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = AppConfig::from_env();
    init_tracing(&config);
    tracing::info!("Configuration: {}", config.describe());

    let cli = Cli::parse();

    match cli.command {
        Commands::Process { file, preset } => process(&config, file, &preset).await,
        Commands::Status { job_id } => {
            let transport = HttpTransport::new(&config)?;
            let status = transport.fetch_status(&job_id).await?;
            print_json(&status)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let transport = HttpTransport::new(&config)?;
            let health = transport.health_check().await?;
            print_json(&health)?;
            Ok(if health.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
