//! Export client configuration.
//!
//! Environment variables:
//! - `EXPORT_SERVICE_URL`: base URL of the export service (default: http://127.0.0.1:8080/v1.0/myorg)
//! - `EXPORT_ACCESS_TOKEN`: bearer token forwarded on every request (default: none)
//! - `EXPORT_REQUEST_TIMEOUT_SECS`: per-request HTTP timeout (default: 30)
//! - `EXPORT_POLL_TIMEOUT_SECS`: per-attempt polling budget (default: 300)
//! - `EXPORT_POLL_INTERVAL_SECS`: wait between polls when the service sends no hint (default: 5)
//! - `EXPORT_MAX_ATTEMPTS`: maximum job submissions per export (default: 3)

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8080/v1.0/myorg";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct ExportConfig {
    pub service_url: String,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    /// Budget for one polling loop; a retry starts a fresh budget.
    pub poll_timeout: Duration,
    /// Fallback wait between status queries when the service sends no
    /// `Retry-After`.
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            access_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("service_url", &self.service_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl ExportConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            service_url: lookup("EXPORT_SERVICE_URL").unwrap_or(defaults.service_url),
            access_token: lookup("EXPORT_ACCESS_TOKEN").filter(|t| !t.is_empty()),
            request_timeout: parse_secs(&lookup, "EXPORT_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
            poll_timeout: parse_secs(&lookup, "EXPORT_POLL_TIMEOUT_SECS")?
                .unwrap_or(defaults.poll_timeout),
            poll_interval: parse_secs(&lookup, "EXPORT_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.poll_interval),
            max_attempts: parse(&lookup, "EXPORT_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError {
                key: "EXPORT_MAX_ATTEMPTS",
                message: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError {
                key: "EXPORT_POLL_INTERVAL_SECS",
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.service_url.trim().is_empty() {
            return Err(ConfigError {
                key: "EXPORT_SERVICE_URL",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
            key,
            message: format!("cannot parse {:?}: {}", raw, e),
        }),
    }
}

fn parse_secs<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<F, u64>(lookup, key)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ExportConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ExportConfig::from_lookup(lookup_from(&[
            ("EXPORT_SERVICE_URL", "https://reports.example.com/v1"),
            ("EXPORT_ACCESS_TOKEN", "secret"),
            ("EXPORT_POLL_TIMEOUT_SECS", "60"),
            ("EXPORT_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.service_url, "https://reports.example.com/v1");
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert_eq!(config.poll_timeout, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 5);
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ExportConfig::from_lookup(lookup_from(&[("EXPORT_POLL_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(err.key, "EXPORT_POLL_INTERVAL_SECS");
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let err =
            ExportConfig::from_lookup(lookup_from(&[("EXPORT_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert_eq!(err.key, "EXPORT_MAX_ATTEMPTS");
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = ExportConfig::from_lookup(lookup_from(&[("EXPORT_POLL_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert_eq!(err.key, "EXPORT_POLL_INTERVAL_SECS");

        let config = ExportConfig {
            poll_interval: Duration::ZERO,
            ..ExportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
