//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human output
/// - `DATABASE_URL`: PostgreSQL; unset runs on the in-memory store
/// - `REDIS_URL`: session cache; unset runs on an in-memory cache
/// - `COORDINATOR_URL`: DTM server API root; unset runs the local coordinator
/// - `PARTICIPANT_BASE_URL`: how the coordinator reaches `/saga/*`
///   (default: `http://127.0.0.1:{PORT}/saga`)
/// - `COORDINATOR_TIMEOUT_SECS`: submission timeout (default: `10`)
/// - `SESSION_TTL_SECS`: sliding session lifetime (default: `360000`)
/// - `STEP_MAX_ATTEMPTS`: local coordinator attempts per branch (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub coordinator_url: Option<String>,
    pub participant_base_url: String,
    pub coordinator_timeout: Duration,
    pub session_ttl: Duration,
    pub step_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let parsed = |name: &str| non_empty(name).and_then(|v| v.trim().parse::<u64>().ok());

        let port = non_empty("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port,
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT") {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            coordinator_url: non_empty("COORDINATOR_URL"),
            participant_base_url: non_empty("PARTICIPANT_BASE_URL")
                .unwrap_or_else(|| default_participant_base_url(port)),
            coordinator_timeout: parsed("COORDINATOR_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.coordinator_timeout),
            session_ttl: parsed("SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            step_max_attempts: parsed("STEP_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.step_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_participant_base_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/saga")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            redis_url: None,
            coordinator_url: None,
            participant_base_url: default_participant_base_url(3000),
            coordinator_timeout: Duration::from_secs(10),
            session_ttl: Duration::from_secs(360_000),
            step_max_attempts: 3,
        }
    }
}
