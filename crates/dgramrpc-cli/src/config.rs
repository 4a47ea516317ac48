//! Environment defaults
//!
//! Every setting can come from a flag; when the flag is absent the value is
//! taken from the environment, and failing that from the built-in default.
//!
//! | Variable | Default | Used by |
//! |----------|---------|---------|
//! | `DGRAMRPC_ADDR` | `0.0.0.0` | `serve` bind host |
//! | `DGRAMRPC_PORT` | `5000` | `serve` bind port |
//! | `DGRAMRPC_TIMEOUT_MS` | `2000` | `call`, `smoke` per-attempt timeout |
//! | `DGRAMRPC_RETRIES` | `3` | `call`, `smoke` retries after the first attempt |

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use dgramrpc_client::RetryPolicy;

pub const ADDR_VAR: &str = "DGRAMRPC_ADDR";
pub const PORT_VAR: &str = "DGRAMRPC_PORT";
pub const TIMEOUT_VAR: &str = "DGRAMRPC_TIMEOUT_MS";
pub const RETRIES_VAR: &str = "DGRAMRPC_RETRIES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDefaults {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            timeout_ms: 2000,
            retries: 3,
        }
    }
}

impl EnvDefaults {
    /// Reads the defaults from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the defaults through `lookup`. Unset or empty variables keep
    /// the built-in value; malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: var(ADDR_VAR).unwrap_or(defaults.host),
            port: parse_var(PORT_VAR, var(PORT_VAR))?.unwrap_or(defaults.port),
            timeout_ms: parse_var(TIMEOUT_VAR, var(TIMEOUT_VAR))?.unwrap_or(defaults.timeout_ms),
            retries: parse_var(RETRIES_VAR, var(RETRIES_VAR))?.unwrap_or(defaults.retries),
        })
    }

    /// `host:port` for the server socket, bracketing bare IPv6 hosts.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Client retry policy, with flag values taking precedence.
    pub fn retry_policy(&self, timeout_ms: Option<u64>, retries: Option<u32>) -> RetryPolicy {
        RetryPolicy::default()
            .with_per_attempt_timeout(Duration::from_millis(timeout_ms.unwrap_or(self.timeout_ms)))
            .with_retries(retries.unwrap_or(self.retries))
    }
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Invalid {}='{}': {}", name, raw, e))
        })
        .transpose()
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
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let defaults = EnvDefaults::from_lookup(lookup(&[])).unwrap();
        assert_eq!(defaults, EnvDefaults::default());
        assert_eq!(defaults.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_env_overrides() {
        let defaults = EnvDefaults::from_lookup(lookup(&[
            (ADDR_VAR, "127.0.0.1"),
            (PORT_VAR, "6000"),
            (TIMEOUT_VAR, "250"),
            (RETRIES_VAR, "1"),
        ]))
        .unwrap();

        assert_eq!(defaults.bind_addr(), "127.0.0.1:6000");
        assert_eq!(defaults.timeout_ms, 250);
        assert_eq!(defaults.retries, 1);
    }

    #[test]
    fn test_empty_value_keeps_default() {
        let defaults = EnvDefaults::from_lookup(lookup(&[(PORT_VAR, "  ")])).unwrap();
        assert_eq!(defaults.port, 5000);
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = EnvDefaults::from_lookup(lookup(&[(PORT_VAR, "http")])).unwrap_err();
        assert!(err.to_string().contains(PORT_VAR));
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let defaults = EnvDefaults {
            host: "::1".to_string(),
            ..EnvDefaults::default()
        };
        assert_eq!(defaults.bind_addr(), "[::1]:5000");
    }

    #[test]
    fn test_flags_win_over_env() {
        let defaults = EnvDefaults::from_lookup(lookup(&[(TIMEOUT_VAR, "250"), (RETRIES_VAR, "1")])).unwrap();

        let from_env = defaults.retry_policy(None, None);
        assert_eq!(from_env.per_attempt_timeout, Duration::from_millis(250));
        assert_eq!(from_env.max_attempts, 2);

        let from_flags = defaults.retry_policy(Some(100), Some(5));
        assert_eq!(from_flags.per_attempt_timeout, Duration::from_millis(100));
        assert_eq!(from_flags.max_attempts, 6);
    }
}
