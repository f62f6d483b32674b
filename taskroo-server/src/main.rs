//! `TaskRoo` server: hierarchical per-owner task lists over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin taskroo-server
//!
//! # Run on custom address with debug logging to a file
//! cargo run --bin taskroo-server -- --bind 127.0.0.1:3000 --log-level debug --log-file /tmp/taskroo.log
//!
//! # Or via environment variables
//! TASKROO_ADDR=127.0.0.1:3000 TASKROO_LOG=debug cargo run --bin taskroo-server
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use taskroo_server::api::{self, AppState};
use taskroo_server::config::{ServerCliArgs, ServerConfig};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Held until shutdown so buffered file logs are flushed.
    let _guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(addr = %config.bind_addr, owner_header = %config.owner_header, "starting taskroo server");

    let state = match AppState::in_memory(&config.owner_header) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %e, header = %config.owner_header, "invalid owner header");
            std::process::exit(1);
        }
    };

    match api::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskroo server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "taskroo server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start taskroo server");
            std::process::exit(1);
        }
    }
}

/// Initialize logging to stderr, or to `file_path` when one is configured.
///
/// Returns a [`WorkerGuard`] for file logging that must be held until
/// shutdown to ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)))
    else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
