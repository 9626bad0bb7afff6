//! Server configuration, read from environment variables (spec §6).

use std::env;
use std::time::Duration;

/// Runtime configuration. All fields have sane defaults so the server can
/// boot with no environment configured at all.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the JSON-over-stdio protocol's companion TCP listener, if
    /// one is enabled; stdio itself needs no port.
    pub port: u16,
    pub health_port: u16,
    pub ws_port: u16,
    pub log_level: String,
    /// `sqlite://<path>` or `memory://`; anything else falls back to
    /// in-memory storage with a warning.
    pub storage_backend_url: String,
    pub trace_retention: Duration,
    pub max_connections_per_resource: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            health_port: 8081,
            ws_port: 8082,
            log_level: "info".to_string(),
            storage_backend_url: "memory://".to_string(),
            trace_retention: Duration::from_secs(30 * 24 * 3600),
            max_connections_per_resource: 10,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("PORT", defaults.port),
            health_port: env_or("HEALTH_PORT", defaults.health_port),
            ws_port: env_or("WS_PORT", defaults.ws_port),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            storage_backend_url: env::var("STORAGE_BACKEND_URL").unwrap_or(defaults.storage_backend_url),
            trace_retention: Duration::from_secs(
                env_or("TRACE_RETENTION_DAYS", 30u64) * 24 * 3600,
            ),
            max_connections_per_resource: env_or("MAX_CONNECTIONS_PER_RESOURCE", defaults.max_connections_per_resource),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.trace_retention, Duration::from_secs(30 * 24 * 3600));
    }
}
