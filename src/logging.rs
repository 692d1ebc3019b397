//! Tracing subscriber setup and log hygiene helpers.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Number of characters of a secret that may appear in logs.
const SECRET_PREFIX_LEN: usize = 8;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when present; otherwise the configured `LOG_LEVEL` is used
/// for the whole process.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Plain => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

/// Short, log-safe prefix of a credential.
pub fn secret_prefix(secret: Option<&str>) -> String {
    match secret {
        Some(value) if !value.is_empty() => {
            let prefix: String = value.chars().take(SECRET_PREFIX_LEN).collect();
            format!("{}…", prefix)
        }
        _ => "<unset>".to_string(),
    }
}
