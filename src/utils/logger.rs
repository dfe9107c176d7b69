use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "wnv.log";

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("wnv_outbreak=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wnv_outbreak=info"))
    }
}

/// Compact stdout logging, plus a plain-text `wnv.log` in `log_dir` when given.
/// The log file is truncated on every run.
pub fn init_cli_logger(verbose: bool, log_dir: Option<&Path>) {
    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("⚠️ Could not create log directory {}: {}", dir.display(), e);
            return None;
        }
        match File::create(dir.join(LOG_FILE_NAME)) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("⚠️ Could not open log file in {}: {}", dir.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(file_layer)
        .init();
}

/// JSON lines on stdout, for running under a scheduler that collects structured logs.
pub fn init_json_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}
