//! Configuration system for the `MentorChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/mentorchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use mentorchat_proto::message::UserId;

use crate::session::{
    DEFAULT_COMMAND_BUFFER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY, SessionConfig,
};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A required setting was not provided anywhere.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A URL setting could not be used.
    #[error("invalid {field}: {reason}")]
    InvalidUrl {
        /// Which setting was invalid.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    ui: UiFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    base_url: Option<String>,
    ws_url: Option<String>,
    viewer_id: Option<String>,
    auth_token: Option<String>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    reconnect_delay_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    command_buffer: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Base URL of the REST API.
    pub base_url: Option<String>,
    /// WebSocket URL of the live channel; derived from `base_url` if unset.
    pub ws_url: Option<String>,
    /// The user this client acts for.
    pub viewer_id: Option<String>,
    /// The other party of the conversation (CLI only).
    pub counterpart: Option<String>,
    /// Bearer token sent with REST requests.
    pub auth_token: Option<String>,

    // -- Session --
    /// Delay before reconnecting after a lost or failed connection.
    pub reconnect_delay: Duration,
    /// Bound on a single live-channel connection attempt.
    pub connect_timeout: Duration,
    /// Bound on a single REST request.
    pub request_timeout: Duration,
    /// Capacity of the session command queue.
    pub command_buffer: usize,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            ws_url: None,
            viewer_id: None,
            counterpart: None,
            auth_token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Duration::from_secs(15),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

/// Validated server coordinates needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// REST API base.
    pub base_url: Url,
    /// Live channel.
    pub ws_url: Url,
    /// The user this client acts for.
    pub viewer: UserId,
    /// The other party.
    pub counterpart: UserId,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/mentorchat/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.server.base_url.clone()),
            ws_url: cli.ws_url.clone().or_else(|| file.server.ws_url.clone()),
            viewer_id: cli
                .viewer_id
                .clone()
                .or_else(|| file.server.viewer_id.clone()),
            counterpart: cli.counterpart.clone(),
            auth_token: cli
                .auth_token
                .clone()
                .or_else(|| file.server.auth_token.clone()),
            reconnect_delay: file
                .session
                .reconnect_delay_ms
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            connect_timeout: file
                .session
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .session
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            command_buffer: file
                .session
                .command_buffer
                .unwrap_or(defaults.command_buffer),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Validate the server settings.
    ///
    /// `ws_url` falls back to `{base_url}/ws` with the scheme switched to
    /// `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Missing`] if `base_url`, `viewer_id`, or
    ///   `counterpart` is absent or empty.
    /// - [`ConfigError::InvalidUrl`] if a URL does not parse or has the
    ///   wrong scheme.
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let base_url = parse_url("base_url", required(self.base_url.as_deref(), "base_url")?)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                field: "base_url",
                reason: format!("expected http or https, got {}", base_url.scheme()),
            });
        }

        let ws_url = match self.ws_url.as_deref() {
            Some(raw) => parse_url("ws_url", raw)?,
            None => derive_ws_url(&base_url)?,
        };
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl {
                field: "ws_url",
                reason: format!("expected ws or wss, got {}", ws_url.scheme()),
            });
        }

        Ok(Endpoints {
            base_url,
            ws_url,
            viewer: UserId::new(required(self.viewer_id.as_deref(), "viewer_id")?),
            counterpart: UserId::new(required(self.counterpart.as_deref(), "counterpart")?),
        })
    }

    /// Build the session settings for `viewer`.
    #[must_use]
    pub fn session_config(&self, viewer: UserId) -> SessionConfig {
        SessionConfig {
            viewer,
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
            command_buffer: self.command_buffer,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Mentoring chat client")]
pub struct CliArgs {
    /// Base URL of the chat server's REST API.
    #[arg(long, env = "MENTORCHAT_BASE_URL")]
    pub base_url: Option<String>,

    /// WebSocket URL of the live channel (default: derived from base URL).
    #[arg(long, env = "MENTORCHAT_WS_URL")]
    pub ws_url: Option<String>,

    /// Your user id.
    #[arg(long, env = "MENTORCHAT_VIEWER_ID")]
    pub viewer_id: Option<String>,

    /// User id of the person to chat with.
    #[arg(long, env = "MENTORCHAT_COUNTERPART")]
    pub counterpart: Option<String>,

    /// Bearer token for the REST API.
    #[arg(long, env = "MENTORCHAT_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Path to config file (default: `~/.config/mentorchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "MENTORCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/mentorchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })
}

fn derive_ws_url(base: &Url) -> Result<Url, ConfigError> {
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let mut ws = base.clone();
    ws.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
        field: "ws_url",
        reason: format!("cannot derive from {base}"),
    })?;
    ws.set_path(&format!("{}/ws", base.path().trim_end_matches('/')));
    Ok(ws)
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("mentorchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
