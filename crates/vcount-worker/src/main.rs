//! Command-line analysis of local video files.
//!
//! ## Commands
//!
//! - `analyze`: run the full pipeline on a file and print the report
//! - `history`: list stored analysis records

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcount_media::VideoUpload;
use vcount_models::{AnalysisConfig, DEFAULT_ALERT_LIMIT, DEFAULT_INTERVAL_SECONDS};
use vcount_storage::HistoryStore;
use vcount_worker::setup::{build_orchestrator, open_history, summarizer_from_env};
use vcount_worker::{RunHandle, WorkerConfig};

#[derive(Parser)]
#[command(name = "vcount-worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Count objects in video files, interval by interval", long_about = None)]
struct Cli {
    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a local video file
    Analyze {
        /// Video file (mp4, avi, mov or mkv)
        video: PathBuf,

        /// Interval length in seconds (10-300)
        #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECONDS)]
        interval_seconds: u32,

        /// Alert when an interval's count exceeds this
        #[arg(short, long, default_value_t = DEFAULT_ALERT_LIMIT)]
        alert_limit: u32,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip interval summaries even when GEMINI_API_KEY is set
        #[arg(long)]
        no_summary: bool,
    },

    /// List stored analyses, newest first
    History {
        /// Maximum records to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = WorkerConfig::from_env();

    match cli.command {
        Commands::Analyze {
            video,
            interval_seconds,
            alert_limit,
            output,
            no_summary,
        } => {
            let analysis = AnalysisConfig::new(interval_seconds, alert_limit)?;
            let upload = VideoUpload::from_path(&video)
                .with_context(|| format!("Cannot analyze {}", video.display()))?;

            let history = open_history(&config).await?;
            let summarizer = if no_summary { None } else { summarizer_from_env()? };
            let orchestrator = build_orchestrator(&config, Arc::clone(&history), summarizer).await?;

            info!(video = %video.display(), "Starting analysis");
            let handle = RunHandle::detached();
            // Dropping the run on Ctrl-C stops ffmpeg and skips the history write
            let outcome = tokio::select! {
                result = orchestrator.run(upload, analysis, &handle) => result?,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("Interrupted before the analysis finished");
                }
            };

            let json = serde_json::to_string_pretty(&outcome.report)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Report written");
                }
                None => println!("{}", json),
            }

            if let Some(id) = outcome.record_id {
                info!(record_id = %id, "Stored in history");
            }
            if let Some(error) = outcome.persistence_error {
                eprintln!("warning: report not stored in history: {}", error);
            }
        }
        Commands::History { limit } => {
            if let Some(notice) = history_notice(&config) {
                warn!("{}", notice);
            }
            let history = open_history(&config).await?;
            let records = history.list(Some(limit)).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// Listing without `HISTORY_PATH` reads a store that was created empty.
fn history_notice(config: &WorkerConfig) -> Option<&'static str> {
    config
        .history_path
        .is_none()
        .then_some("HISTORY_PATH not set, listing a fresh in-memory history (always empty)")
}

/// Colored output for dev, JSON for production.
fn init_tracing(json_flag: bool) {
    let use_json = json_flag
        || std::env::var("LOG_FORMAT")
            .map(|v| v.to_lowercase() == "json")
            .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vcount=info,vcount_worker=info,vcount_media=info,ort=warn"));

    // Logs go to stderr so the report on stdout stays machine-readable
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_json_flag_has_no_env_fallback() {
        let command = Cli::command();
        let json = command
            .get_arguments()
            .find(|arg| arg.get_id() == "json")
            .unwrap();
        assert!(json.get_env().is_none());

        let cli = Cli::try_parse_from(["vcount-worker", "history", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn test_history_without_path_warns() {
        let config = WorkerConfig::default();
        assert!(history_notice(&config).is_some());

        let config = WorkerConfig {
            history_path: Some(PathBuf::from("history.jsonl")),
            ..WorkerConfig::default()
        };
        assert!(history_notice(&config).is_none());
    }
}
