//! Tracing subscriber setup for hosts embedding the engine

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;
use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "human" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Default filter directive for a level name, scoped to this crate
fn directive(level: &str) -> String {
    match level.trim().to_lowercase().as_str() {
        "trace" => "debug,oneiric=trace".to_string(),
        "debug" => "info,oneiric=debug".to_string(),
        "warn" => "warn".to_string(),
        "error" => "error".to_string(),
        _ => "warn,oneiric=info".to_string(),
    }
}

/// Install a global subscriber writing to stderr.
///
/// `RUST_LOG` wins over the configured level when set.
///
/// # Errors
///
/// [`RagError::Config`] for an unknown format, or when a global subscriber
/// is already installed.
pub fn try_init_tracing(config: &LoggingConfig) -> Result<()> {
    let format = LogFormat::parse(&config.format)
        .ok_or_else(|| RagError::Config(format!("unknown log format: {}", config.format)))?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(&config.level)));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|err| RagError::Config(format!("tracing already initialised: {err}")))
}

/// Like [`try_init_tracing`], ignoring a subscriber that is already installed
pub fn init_tracing(config: &LoggingConfig) {
    if let Err(err) = try_init_tracing(config) {
        tracing::debug!(error = %err, "tracing not initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_directive_scopes_crate() {
        assert_eq!(directive("debug"), "info,oneiric=debug");
        assert_eq!(directive("nonsense"), "warn,oneiric=info");
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let config = LoggingConfig {
            format: "xml".to_string(),
            level: "info".to_string(),
        };
        assert!(matches!(try_init_tracing(&config), Err(RagError::Config(_))));
    }
}
