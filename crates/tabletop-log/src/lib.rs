//! Structured logging for the relay and its clients.
//!
//! Console output carries uptime timestamps and targets. When a log
//! directory is configured, a second layer writes one JSON object per event
//! to `relay.log` for post-mortem analysis. `RUST_LOG` always wins over the
//! configured level.

use std::path::Path;

use tabletop_config::Config;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config says otherwise.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file inside the log directory.
pub const LOG_FILE: &str = "relay.log";

/// Filter directive for `config`: its `debug.log_level`, or
/// [`DEFAULT_FILTER`] if that is blank or there is no config.
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.clone()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Install the global tracing subscriber.
///
/// `log_dir` enables the JSON file layer; if the directory or file cannot be
/// created, logging falls back to the console alone. `log` records from
/// dependencies are forwarded into tracing.
///
/// Fails only if a global subscriber is already installed.
///
/// ```no_run
/// use tabletop_config::Config;
/// use tabletop_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), Some(&config)).ok();
/// ```
pub fn init_logging(log_dir: Option<&Path>, config: Option<&Config>) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).try_init()?;
        tracing::debug!("Writing JSON logs to {}", log_dir.join(LOG_FILE).display());
        return Ok(());
    }

    subscriber.try_init()
}
