//! cring-session - terminal front end for the CRING! Partner session lock.
//!
//! Drives the idle detector, lock coordinator and password prompt from the
//! command line. `watch` reads activity from stdin (one DOM event name per
//! line) and locks the session when the input goes quiet.

mod app;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cring_session_core::{Config, StorageBackend};

use app::App;

/// Log file name prefix inside the cache directory
const LOG_FILE_NAME: &str = "cring-session.log";

#[derive(Parser)]
#[command(name = "cring-session", version, about = "CRING! Partner session idle-lock")]
struct Cli {
    /// Keep all state in memory for this run
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show credential and lock state
    Status,
    /// Pass the password gate and store fresh credentials
    Login {
        /// Partner user id (defaults to the last one used)
        #[arg(long)]
        user: Option<String>,
    },
    /// Lock the session, masking protected data
    Lock {
        /// Lock duration in minutes (defaults to the configured lock duration)
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Lift the lock early by re-acquiring a token
    Unlock,
    /// Clear stored credentials and any lock
    Logout,
    /// Watch stdin for activity and lock when idle
    Watch,
    /// Show or change display preferences
    Prefs {
        /// system, light or dark
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        toggle_sidebar: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if cli.ephemeral {
        config.storage = StorageBackend::Memory;
    }

    let _guard = init_tracing(config.cache_dir().ok().map(|dir| dir.join("logs")));
    info!("cring-session starting");

    let mut app = App::new(config)?;
    app.mount().await?;

    let result = match cli.command {
        Command::Status => app.print_status(),
        Command::Login { user } => app.login(user).await,
        Command::Lock { minutes } => app.lock(minutes),
        Command::Unlock => app.unlock().await,
        Command::Logout => app.logout(),
        Command::Watch => app.watch().await,
        Command::Prefs {
            theme,
            toggle_sidebar,
        } => app.prefs(theme.as_deref(), toggle_sidebar),
    };

    info!("cring-session shutting down");
    result
}
