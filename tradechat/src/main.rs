//! `TradeChat`: community chat for the trading simulator, in the terminal.
//!
//! Connects to the chat socket of a trading site and prints the room to
//! stdout. Lines typed on stdin go to the chat box (`/share`, `/stats`,
//! `/clear`, `/help` included); `:hide` and `:show` close and reopen the
//! chat surface, `:quit` exits.
//!
//! ```bash
//! cargo run --bin tradechat -- --origin https://trade.example.com \
//!     --token "$TOKEN" --username alice --trading-data ~/trading.json
//!
//! # Or via environment variables
//! TRADECHAT_ORIGIN=http://localhost:8000 TRADECHAT_TOKEN=... \
//!     TRADECHAT_USERNAME=alice cargo run
//! ```

use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use tradechat::chat::{ChatController, ChatHandle};
use tradechat::config::{CliArgs, ClientConfig};
use tradechat::console::{ConsoleInput, ConsolePresenter, classify};
use tradechat::trading::FileTradingData;
use tradechat::transport::ws::WsConnector;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the chat.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("tradechat starting");

    let Some(settings) = config.to_chat_settings() else {
        eprintln!("No chat origin configured. Pass --origin or set [server] origin in the config file.");
        return Ok(());
    };
    let credentials = config.credentials();
    if !credentials.is_complete() {
        eprintln!("Not logged in: a token and a username are required.");
        return Ok(());
    }

    let trading_path = config
        .trading_data_file
        .clone()
        .unwrap_or_else(default_trading_path);
    tracing::info!(path = %trading_path.display(), "reading trading data");

    let (mut controller, handle) = ChatController::new(
        WsConnector::new(config.connect_timeout),
        ConsolePresenter::new(io::stdout(), config.timestamp_format.clone()),
        FileTradingData::new(trading_path),
        credentials,
        settings,
    );

    handle.open_surface().await;
    tokio::spawn(read_console(handle));
    controller.run().await;

    tracing::info!("tradechat exiting");
    Ok(())
}

/// Forwards stdin lines to the controller until `:quit` or end of input.
async fn read_console(handle: ChatHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let delivered = match classify(&line) {
            ConsoleInput::Show => handle.open_surface().await,
            ConsoleInput::Hide => handle.close_surface().await,
            ConsoleInput::Quit => break,
            ConsoleInput::Text(text) => handle.submit(text).await,
        };
        if !delivered {
            return;
        }
    }
    handle.shutdown().await;
}

/// Trading data location when none is configured.
fn default_trading_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tradechat")
        .join("trading.json")
}

/// Initialize file-based logging.
///
/// Logs are written to `$TMPDIR/tradechat.log` by default. `RUST_LOG`
/// overrides `level` when set.
///
/// Returns a guard that must be held for the lifetime of the program to
/// ensure all buffered log lines are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tradechat.log");
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
