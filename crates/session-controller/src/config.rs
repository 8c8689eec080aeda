//! Session controller configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default maximum concurrent sessions per instance.
pub const DEFAULT_MAX_SESSIONS: u32 = 500;

/// Default maximum participants per session.
pub const DEFAULT_MAX_PARTICIPANTS_PER_SESSION: u32 = 200;

/// Default buffer size for the per-session event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_BUFFER: usize = 256;

/// Session controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this controller instance.
    pub instance_id: String,

    /// Maximum concurrent sessions this instance can host.
    pub max_sessions: u32,

    /// Maximum participants in one session.
    pub max_participants_per_session: u32,

    /// Buffer size for each session's event broadcast channel.
    pub event_channel_buffer: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let health_bind_address = vars
            .get("LC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let max_sessions = vars
            .get("LC_MAX_SESSIONS")
            .map(|s| {
                s.parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("LC_MAX_SESSIONS: {s}")))
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_SESSIONS);

        let max_participants_per_session = vars
            .get("LC_MAX_PARTICIPANTS_PER_SESSION")
            .map(|s| {
                s.parse().map_err(|_| {
                    ConfigError::InvalidValue(format!("LC_MAX_PARTICIPANTS_PER_SESSION: {s}"))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_PARTICIPANTS_PER_SESSION);

        let event_channel_buffer = vars
            .get("LC_EVENT_CHANNEL_BUFFER")
            .map(|s| {
                s.parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("LC_EVENT_CHANNEL_BUFFER: {s}")))
            })
            .transpose()?
            .unwrap_or(DEFAULT_EVENT_CHANNEL_BUFFER);

        // Generate instance ID if not provided
        let instance_id = vars.get("LC_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("lc-{hostname}-{short_suffix}")
        });

        Ok(Config {
            health_bind_address,
            instance_id,
            max_sessions,
            max_participants_per_session,
            event_channel_buffer,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(
            config.max_participants_per_session,
            DEFAULT_MAX_PARTICIPANTS_PER_SESSION
        );
        assert_eq!(config.event_channel_buffer, DEFAULT_EVENT_CHANNEL_BUFFER);
        assert!(config.instance_id.starts_with("lc-"));
    }

    #[test]
    fn test_from_vars_overrides() {
        let vars = HashMap::from([
            ("LC_HEALTH_BIND_ADDRESS".to_string(), "127.0.0.1:9999".to_string()),
            ("LC_MAX_SESSIONS".to_string(), "10".to_string()),
            ("LC_MAX_PARTICIPANTS_PER_SESSION".to_string(), "30".to_string()),
            ("LC_EVENT_CHANNEL_BUFFER".to_string(), "64".to_string()),
            ("LC_INSTANCE_ID".to_string(), "lc-test-1".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.health_bind_address, "127.0.0.1:9999");
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.max_participants_per_session, 30);
        assert_eq!(config.event_channel_buffer, 64);
        assert_eq!(config.instance_id, "lc-test-1");
    }

    #[test]
    fn test_from_vars_invalid_number() {
        let vars = HashMap::from([("LC_MAX_SESSIONS".to_string(), "lots".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
