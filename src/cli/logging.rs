//! Logging initialization

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Initialize logging
///
/// With `debug`, everything at debug level goes to a temp file whose path is
/// returned, so stdout stays clean for the update stream. Otherwise logs go
/// to stderr at `level`. `RUST_LOG` overrides the level in both cases.
pub fn init_logging(debug: bool, level: &str) -> Option<PathBuf> {
    if debug {
        let temp_file = tempfile::Builder::new()
            .prefix("fluxfleet-")
            .suffix(".log")
            .tempfile()
            .map(|f| {
                let path = f.path().to_path_buf();
                // Keep the file on disk after the handle goes away
                std::mem::forget(f);
                path
            })
            .unwrap_or_else(|_| std::env::temp_dir().join(format!("fluxfleet-{}.log", std::process::id())));

        let file = match std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_file)
        {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", temp_file.display(), e);
                return None;
            }
        };

        tracing_subscriber::fmt()
            .with_writer(file)
            .with_env_filter(env_filter("debug"))
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();

        Some(temp_file)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter(level))
            .with_target(false)
            .init();
        None
    }
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
