/**
 * Server Configuration
 *
 * This module loads server configuration from environment variables, with
 * sensible defaults for local development.
 *
 * # Error Handling
 *
 * Configuration problems are logged but do not prevent server startup.
 * When no completion endpoint is configured the server runs with a
 * provider that always fails, which the router converts into the fixed
 * fallback reply.
 */

use std::sync::Arc;
use std::time::Duration;

use crate::backend::completion::{CompletionProvider, HttpCompletionProvider, UnconfiguredProvider};

/// Runtime configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the server binds
    pub port: u16,
    /// Interval between server-emitted heartbeat events
    pub heartbeat_interval: Duration,
    /// How many recent messages accompany each provider call
    pub history_window: usize,
    /// Timeout for one completion provider call
    pub completion_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            heartbeat_interval: Duration::from_secs(30),
            history_window: 10,
            completion_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("SERVER_PORT", defaults.port),
            heartbeat_interval: Duration::from_secs(env_parse(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
            history_window: env_parse("HISTORY_WINDOW", defaults.history_window),
            completion_timeout: Duration::from_secs(env_parse(
                "COMPLETION_TIMEOUT_SECS",
                defaults.completion_timeout.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Load the completion provider from environment configuration.
///
/// Requires `COMPLETION_API_URL` and `COMPLETION_API_KEY`; the model name
/// defaults to `support-small`. Returns the always-failing
/// [`UnconfiguredProvider`] when either variable is missing, so the server
/// still starts and answers with fallback replies.
pub fn load_completion_provider(config: &ServerConfig) -> Arc<dyn CompletionProvider> {
    let endpoint = std::env::var("COMPLETION_API_URL").ok();
    let api_key = std::env::var("COMPLETION_API_KEY").ok();

    match (endpoint, api_key) {
        (Some(endpoint), Some(api_key)) => {
            let model =
                std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| "support-small".to_string());
            tracing::info!("Completion provider configured: {} ({})", endpoint, model);
            Arc::new(HttpCompletionProvider::new(
                endpoint,
                api_key,
                model,
                config.completion_timeout,
            ))
        }
        _ => {
            tracing::warn!(
                "COMPLETION_API_URL / COMPLETION_API_KEY not set. \
                 Replies will use the fallback text."
            );
            Arc::new(UnconfiguredProvider)
        }
    }
}
