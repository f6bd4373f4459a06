use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::env;

/// Install the global subscriber: stderr filtered by `DOCCHAT_LOG` (default
/// `info`), plus a debug-level file layer when `DOCCHAT_LOG_FILE` is set.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env(env::LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    match std::env::var(env::LOG_FILE).ok().filter(|p| !p.trim().is_empty()) {
        Some(log_path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open log file: {}", log_path))?;

            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);

            registry
                .with(file_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;
            tracing::debug!(path = %log_path, "File logging enabled");
        }
        None => registry
            .try_init()
            .context("Failed to install tracing subscriber")?,
    }
    Ok(())
}
