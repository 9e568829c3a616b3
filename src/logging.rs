use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use cortex::config::Paths;

const MAX_LINES: usize = 1000;
const KEEP_LINES: usize = 750;

/// Rotate the log file if it exceeds 1000 lines.
/// Keeps the most recent 750 lines.
pub fn rotate_log(paths: &Paths) {
    let log_path = &paths.log_file;
    if !log_path.exists() {
        return;
    }

    let content = match std::fs::read_to_string(log_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= MAX_LINES {
        return;
    }

    let start = lines.len() - KEEP_LINES;
    let trimmed = lines[start..].join("\n");
    let _ = std::fs::write(log_path, format!("{}\n", trimmed));
}

/// Set up file-based logging with tracing-subscriber.
///
/// Logs go to `~/.cortex/cortex.log`. Default level: DEBUG for cortex, WARN
/// for dependencies. Nothing is written to the terminal so command output
/// stays clean.
pub fn setup_logging(paths: &Paths) -> Result<()> {
    paths.ensure_dirs()?;

    let log_file = open_log_file(&paths.log_file)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cortex=debug,ctx=debug,warn"));

    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    tracing::debug!("Logging initialized, writing to {}", paths.log_file.display());

    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
