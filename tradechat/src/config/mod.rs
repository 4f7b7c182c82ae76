//! Configuration system for the `TradeChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tradechat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::{ChatSettings, Credentials, ReconnectPolicy};

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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    account: AccountFileConfig,
    chat: ChatFileConfig,
    trading: TradingFileConfig,
    ui: UiFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    origin: Option<String>,
    chat_path: Option<String>,
    connect_timeout_secs: Option<u64>,
}

/// `[account]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AccountFileConfig {
    token: Option<String>,
    username: Option<String>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    auth_delay_ms: Option<u64>,
    reconnect_delay_secs: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    channel_capacity: Option<usize>,
}

/// `[trading]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TradingFileConfig {
    data_file: Option<PathBuf>,
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
    /// Origin of the hosting page, e.g. `https://trade.example.com`.
    pub origin: Option<String>,
    /// Path of the chat socket on the origin host.
    pub chat_path: String,
    /// Timeout for the WebSocket handshake.
    pub connect_timeout: Duration,

    // -- Account --
    /// Bearer token.
    pub token: Option<String>,
    /// Display name.
    pub username: Option<String>,

    // -- Chat --
    /// Delay between transport open and the `auth` envelope.
    pub auth_delay: Duration,
    /// Delay before reconnecting after an abnormal close.
    pub reconnect_delay: Duration,
    /// Optional ceiling on consecutive reconnect attempts (unbounded if `None`).
    pub max_reconnect_attempts: Option<u32>,
    /// Capacity of the session event channel.
    pub channel_capacity: usize,

    // -- Trading --
    /// JSON file with the user's transactions and balance.
    pub trading_data_file: Option<PathBuf>,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: None,
            chat_path: "/ws/chat".to_string(),
            connect_timeout: Duration::from_secs(10),
            token: None,
            username: None,
            auth_delay: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: None,
            channel_capacity: 256,
            trading_data_file: None,
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/tradechat/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
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
            origin: cli.origin.clone().or_else(|| file.server.origin.clone()),
            chat_path: file
                .server
                .chat_path
                .clone()
                .unwrap_or(defaults.chat_path),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            token: cli.token.clone().or_else(|| file.account.token.clone()),
            username: cli
                .username
                .clone()
                .or_else(|| file.account.username.clone()),
            auth_delay: file
                .chat
                .auth_delay_ms
                .map_or(defaults.auth_delay, Duration::from_millis),
            reconnect_delay: file
                .chat
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            max_reconnect_attempts: file.chat.max_reconnect_attempts,
            channel_capacity: file
                .chat
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            trading_data_file: cli
                .trading_data
                .clone()
                .or_else(|| file.trading.data_file.clone()),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Build [`ChatSettings`] from this configuration.
    ///
    /// Returns `None` if no origin is configured.
    #[must_use]
    pub fn to_chat_settings(&self) -> Option<ChatSettings> {
        let origin = self.origin.clone()?;
        Some(ChatSettings {
            origin,
            chat_path: self.chat_path.clone(),
            auth_delay: self.auth_delay,
            reconnect: ReconnectPolicy {
                delay: self.reconnect_delay,
                max_attempts: self.max_reconnect_attempts,
            },
            channel_capacity: self.channel_capacity,
        })
    }

    /// Credentials as configured; empty fields stay empty and make
    /// `connect()` fail with `MissingCredentials`.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.token.clone().unwrap_or_default(),
            self.username.clone().unwrap_or_default(),
        )
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Community chat for the trading simulator")]
pub struct CliArgs {
    /// Origin of the trading site (e.g. `https://trade.example.com`).
    #[arg(long, env = "TRADECHAT_ORIGIN")]
    pub origin: Option<String>,

    /// Bearer token of the logged-in user.
    #[arg(long, env = "TRADECHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Display name of the logged-in user.
    #[arg(long, env = "TRADECHAT_USERNAME")]
    pub username: Option<String>,

    /// JSON file with transactions and balance, used by `/share` and `/stats`.
    #[arg(long)]
    pub trading_data: Option<PathBuf>,

    /// Path to config file (default: `~/.config/tradechat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TRADECHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tradechat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

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
        config_dir.join("tradechat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
