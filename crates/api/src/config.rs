//! Application configuration loaded from environment variables.

use std::time::Duration;

use booking::FaultRates;
use common::{PerResource, ResourceType};
use saga::SagaPolicies;
use thiserror::Error;

/// An environment variable with a value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{var} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
    pub expected: &'static str,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory stores when unset
/// - `BOOK_<RESOURCE>_FAIL_RATE`, `CANCEL_<RESOURCE>_FAIL_RATE`: injected fault
///   probability per service and operation (default: `0.0`)
/// - `RETRY_INTERVAL_MS`: first retry delay (default: `1000`)
/// - `CALL_TIMEOUT_MS`: per-attempt deadline (default: `1000`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub fault_rates: PerResource<FaultRates>,
    pub retry_interval: Duration,
    pub call_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => parse(&raw, "PORT", "a port number")?,
            None => defaults.port,
        };

        let mut fault_rates = PerResource::from_fn(|_| FaultRates::NONE);
        for resource in ResourceType::ALL {
            let name = resource.as_str().to_uppercase();
            let book = fault_rate(&lookup, &format!("BOOK_{name}_FAIL_RATE"))?;
            let cancel = fault_rate(&lookup, &format!("CANCEL_{name}_FAIL_RATE"))?;
            *fault_rates.get_mut(resource) = FaultRates { book, cancel };
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            fault_rates,
            retry_interval: millis(&lookup, "RETRY_INTERVAL_MS", defaults.retry_interval)?,
            call_timeout: millis(&lookup, "CALL_TIMEOUT_MS", defaults.call_timeout)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the saga retry policies with the configured timings.
    pub fn saga_policies(&self) -> SagaPolicies {
        SagaPolicies::default()
            .with_initial_interval(self.retry_interval)
            .with_attempt_timeout(self.call_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            fault_rates: PerResource::from_fn(|_| FaultRates::NONE),
            retry_interval: Duration::from_millis(1000),
            call_timeout: Duration::from_millis(1000),
        }
    }
}

fn parse<T: std::str::FromStr>(
    raw: &str,
    var: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError {
        var: var.to_string(),
        value: raw.to_string(),
        expected,
    })
}

fn fault_rate(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<f64, ConfigError> {
    const EXPECTED: &str = "a probability between 0.0 and 1.0";
    let Some(raw) = lookup(var) else {
        return Ok(0.0);
    };
    let rate: f64 = parse(&raw, var, EXPECTED)?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError {
            var: var.to_string(),
            value: raw,
            expected: EXPECTED,
        });
    }
    Ok(rate)
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(var) {
        Some(raw) => parse(&raw, var, "a whole number of milliseconds").map(Duration::from_millis),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_url, None);
        assert_eq!(config.fault_rates.car, FaultRates::NONE);
    }

    #[test]
    fn test_addr_formatting() {
        let config = config_from(&[("HOST", "127.0.0.1"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_fault_rates_per_resource_and_operation() {
        let config = config_from(&[
            ("BOOK_FLIGHT_FAIL_RATE", "0.25"),
            ("CANCEL_CAR_FAIL_RATE", "1"),
        ])
        .unwrap();
        assert_eq!(config.fault_rates.flight.book, 0.25);
        assert_eq!(config.fault_rates.flight.cancel, 0.0);
        assert_eq!(config.fault_rates.car.cancel, 1.0);
        assert_eq!(config.fault_rates.hotel, FaultRates::NONE);
    }

    #[test]
    fn test_rejects_out_of_range_fault_rate() {
        let err = config_from(&[("CANCEL_HOTEL_FAIL_RATE", "1.5")]).unwrap_err();
        assert_eq!(err.var, "CANCEL_HOTEL_FAIL_RATE");
        assert_eq!(err.value, "1.5");
    }

    #[test]
    fn test_rejects_unparseable_values() {
        assert_eq!(config_from(&[("PORT", "eighty")]).unwrap_err().var, "PORT");
        assert_eq!(
            config_from(&[("RETRY_INTERVAL_MS", "-5")]).unwrap_err().var,
            "RETRY_INTERVAL_MS"
        );
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = config_from(&[("DATABASE_URL", " ")]).unwrap();
        assert_eq!(config.database_url, None);
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/trips")]).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/trips"));
    }

    #[test]
    fn test_timings_feed_saga_policies() {
        let config =
            config_from(&[("RETRY_INTERVAL_MS", "10"), ("CALL_TIMEOUT_MS", "250")]).unwrap();
        let policies = config.saga_policies();
        assert_eq!(policies.booking.initial_interval, Duration::from_millis(10));
        assert_eq!(policies.compensation.attempt_timeout, Duration::from_millis(250));
        assert_eq!(policies.compensation.max_attempts, 100);
    }
}
