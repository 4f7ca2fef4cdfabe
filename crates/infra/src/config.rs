//! Configuration loading and representation.
//!
//! All settings come from environment variables (a `.env` file is loaded by the
//! binary before this runs). Parsing goes through a lookup function so tests do
//! not have to touch the process environment.

use std::net::SocketAddr;
use std::time::Duration;

use crate::external::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiConfig};
use crate::jobs::RetryPolicy;
use crate::jobs::dispatcher::DEFAULT_VISIBILITY_GRACE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres store when set, in-memory otherwise
    pub database_url: Option<String>,
    /// Redis queue when set (requires the `redis` feature), in-memory otherwise
    pub redis_url: Option<String>,
    pub openai: OpenAiConfig,
    pub worker_concurrency: usize,
    pub retry_policy: RetryPolicy,
    pub dispatch_grace: Duration,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let openai = OpenAiConfig::new(api_key)
            .with_base_url(get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()))
            .with_model(get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()))
            .with_timeout(Duration::from_secs(parse_or(&get, "OPENAI_TIMEOUT_SECS", 60u64)?));

        let worker_concurrency = parse_or(&get, "WORKER_CONCURRENCY", 4usize)?;
        if worker_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let defaults = RetryPolicy::default();
        let retry_policy = RetryPolicy::new(
            parse_or(&get, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            defaults.base_delay,
        );

        let dispatch_grace = Duration::from_millis(parse_or(
            &get,
            "DISPATCH_GRACE_MS",
            DEFAULT_VISIBILITY_GRACE.as_millis() as u64,
        )?);

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            openai,
            worker_concurrency,
            retry_policy,
            dispatch_grace,
        })
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_the_api_key_is_set() {
        let config = load(&[("OPENAI_API_KEY", "sk-test")]).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.openai.model, "gpt-4");
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.openai.timeout, Duration::from_secs(60));
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.retry_policy, RetryPolicy::default());
        assert_eq!(config.dispatch_grace, Duration::from_millis(100));
    }

    #[test]
    fn api_key_is_required() {
        let err = load(&[("OPENAI_API_KEY", "  ")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENAI_API_KEY"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("DATABASE_URL", "postgres://localhost/docket"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("WORKER_CONCURRENCY", "8"),
            ("RETRY_MAX_ATTEMPTS", "3"),
            ("DISPATCH_GRACE_MS", "0"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/docket"));
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.retry_policy.max_attempts, 3);
        assert!(config.dispatch_grace.is_zero());
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("WORKER_CONCURRENCY", "many"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WORKER_CONCURRENCY", .. }));

        let err = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("WORKER_CONCURRENCY", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WORKER_CONCURRENCY", .. }));
    }
}
