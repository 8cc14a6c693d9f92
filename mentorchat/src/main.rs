//! `MentorChat` — headless mentoring chat client.
//!
//! Opens the conversation with one counterpart, prints the transcript as it
//! changes, and sends every line typed on stdin. EOF or Ctrl-C closes the
//! session. Configuration via CLI flags, environment variables, or config
//! file (`~/.config/mentorchat/config.toml`).
//!
//! ```bash
//! cargo run --bin mentorchat -- --base-url http://localhost:8080 \
//!     --viewer-id mentee-1 --counterpart mentor-7
//!
//! # Or via environment variables
//! MENTORCHAT_BASE_URL=http://localhost:8080 MENTORCHAT_VIEWER_ID=mentee-1 \
//!     MENTORCHAT_COUNTERPART=mentor-7 cargo run
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use mentorchat::config::{CliArgs, ClientConfig, Endpoints};
use mentorchat::render::TranscriptPrinter;
use mentorchat::room::http::HttpRoomService;
use mentorchat::session::{ChannelState, ChatSession, OpenError};
use mentorchat::transport::websocket::WsConnector;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let endpoints = match config.endpoints() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout carries only the transcript.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("mentorchat starting");

    let session = match open_session(&config, &endpoints).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&session, &config.timestamp_format).await;
    session.close().await;
    tracing::info!("mentorchat exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("mentorchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn open_session(config: &ClientConfig, endpoints: &Endpoints) -> Result<ChatSession, String> {
    let rooms = HttpRoomService::new(
        &endpoints.base_url,
        config.request_timeout,
        config.auth_token.clone(),
    )
    .map_err(|e| e.to_string())?;
    let connector = WsConnector::new(endpoints.ws_url.clone(), config.connect_timeout);

    ChatSession::open(
        config.session_config(endpoints.viewer.clone()),
        Arc::new(rooms),
        Arc::new(connector),
        &endpoints.counterpart,
    )
    .await
    .map_err(|e| match e {
        OpenError::NotAuthorized => format!("you may not chat with {}", endpoints.counterpart),
        OpenError::Unavailable(reason) => format!("chat unavailable: {reason}"),
    })
}

/// Prints transcript changes and sends stdin lines until EOF or Ctrl-C.
async fn run(session: &ChatSession, timestamp_format: &str) -> std::io::Result<()> {
    let mut transcript = session.transcript();
    let mut channel = session.channel_state();
    let mut printer = TranscriptPrinter::new(timestamp_format);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let initial = transcript.borrow_and_update().clone();
    for line in printer.update(&initial) {
        println!("{line}");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = session.send(line).await {
                    eprintln!("not sent: {e}");
                }
            }
            changed = transcript.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = transcript.borrow_and_update().clone();
                for line in printer.update(&snapshot) {
                    println!("{line}");
                }
            }
            changed = channel.changed() => {
                if changed.is_err() {
                    break;
                }
                match *channel.borrow_and_update() {
                    ChannelState::Connected => eprintln!("-- live"),
                    ChannelState::Connecting => eprintln!("-- reconnecting"),
                    ChannelState::Disconnected => eprintln!("-- offline"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
