//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `SAGA_MAX_ATTEMPTS`: attempts per step on transient failures (default `3`)
/// - `SAGA_RETRY_BACKOFF_MS`: backoff before the first retry (default `50`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub saga_max_attempts: u32,
    pub saga_retry_backoff_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            saga_max_attempts: lookup("SAGA_MAX_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.saga_max_attempts),
            saga_retry_backoff_ms: lookup("SAGA_RETRY_BACKOFF_MS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.saga_retry_backoff_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.saga_max_attempts,
            Duration::from_millis(self.saga_retry_backoff_ms),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            saga_max_attempts: 3,
            saga_retry_backoff_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("SAGA_MAX_ATTEMPTS", "5"),
            ("SAGA_RETRY_BACKOFF_MS", "10"),
        ]));
        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(
            config.retry_policy().initial_backoff,
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("PORT", "http"), ("SAGA_MAX_ATTEMPTS", "-1")]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.saga_max_attempts, 3);
    }
}
