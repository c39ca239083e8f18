// src/logging.rs

use color_eyre::eyre::Result;
use directories::ProjectDirs;
use lazy_static::lazy_static;
use std::fs::OpenOptions;
use std::path::PathBuf;
use time::macros::format_description;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{self, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

lazy_static! {
    static ref ENV_PREFIX: String = env!("CARGO_CRATE_NAME").to_uppercase();
    /// Log filter directive, consulted when `RUST_LOG` is unset.
    pub static ref LOG_ENV: String = format!("{}_LOGLEVEL", *ENV_PREFIX);
    /// Directory the scan log is written to, instead of the platform data dir.
    pub static ref LOG_DIR_ENV: String = format!("{}_LOG_DIR", *ENV_PREFIX);
    static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

/// Where scan logs live: `VANGUARD_WEBSCAN_LOG_DIR`, else the platform's local data dir,
/// else `./.data`.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(&*LOG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("com", "vanguard-rs", env!("CARGO_PKG_NAME"))
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join(".data"))
}

/// Picks the filter directive: `RUST_LOG` first, then the crate's own variable, then
/// `info` for this crate only (reqwest and hyper stay quiet).
fn filter_directive(rust_log: Option<String>, crate_level: Option<String>) -> String {
    let set = |directive: &String| !directive.trim().is_empty();
    rust_log
        .filter(set)
        .or(crate_level.filter(set))
        .unwrap_or_else(|| format!("{}=info", env!("CARGO_CRATE_NAME")))
}

/// Initializes file-based logging and returns the log file's path. Runs of the binary
/// append to the same file; stdout stays free for reports and control replies.
pub fn initialize_logging() -> Result<PathBuf> {
    let directory = get_data_dir();
    std::fs::create_dir_all(&directory)?;
    let log_path = directory.join(&*LOG_FILE);
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    let directive = filter_directive(std::env::var("RUST_LOG").ok(), std::env::var(&*LOG_ENV).ok());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_timer(LocalTime::new(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        )))
        .with_target(false)
        .with_ansi(false)
        .with_filter(EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()?;

    Ok(log_path)
}
