//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Pick JSON or pretty output
//! - Configure log level from config and environment
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON format for production, pretty format for development

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{Environment, LogFormat, ObservabilityConfig};

/// Resolve the output format: explicit config first, then the deployment mode.
pub fn resolve_format(config: &ObservabilityConfig, environment: Environment) -> LogFormat {
    config.log_format.unwrap_or(match environment {
        Environment::Production => LogFormat::Json,
        Environment::Development => LogFormat::Pretty,
    })
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &ObservabilityConfig, environment: Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("hearth_guard={level},security_audit={level},tower_http=info", level = config.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = match resolve_format(config, environment) {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_follows_environment() {
        let config = ObservabilityConfig::default();
        assert_eq!(resolve_format(&config, Environment::Production), LogFormat::Json);
        assert_eq!(resolve_format(&config, Environment::Development), LogFormat::Pretty);

        let explicit = ObservabilityConfig {
            log_format: Some(LogFormat::Json),
            ..ObservabilityConfig::default()
        };
        assert_eq!(resolve_format(&explicit, Environment::Development), LogFormat::Json);
    }
}
