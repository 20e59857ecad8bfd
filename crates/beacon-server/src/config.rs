use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use beacon_state::GcConfig;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub tombstone_ttl: Duration,
    pub tombstone_granularity: Duration,
    pub persist_interval: Duration,
    pub event_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("BEACON_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8500".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("BEACON_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let db_path = std::env::var("BEACON_DB_PATH")
            .unwrap_or_else(|_| "./beacon.redb".to_string())
            .into();

        let tombstone_ttl = Duration::from_secs(positive_secs("BEACON_TOMBSTONE_TTL_SECS", 900)?);
        let tombstone_granularity =
            Duration::from_secs(positive_secs("BEACON_TOMBSTONE_GRANULARITY_SECS", 30)?);
        let persist_interval =
            Duration::from_secs(positive_secs("BEACON_PERSIST_INTERVAL_SECS", 60)?);

        let event_buffer = match std::env::var("BEACON_EVENT_BUFFER") {
            Ok(s) => s
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid(
                    "BEACON_EVENT_BUFFER",
                    "must be a positive integer",
                ))?,
            Err(_) => 1024,
        };

        Ok(Config {
            listen_addr,
            db_path,
            tombstone_ttl,
            tombstone_granularity,
            persist_interval,
            event_buffer,
        })
    }

    pub fn gc_config(&self) -> GcConfig {
        GcConfig::new(self.tombstone_ttl, self.tombstone_granularity)
    }

    /// Create a test configuration.
    pub fn for_testing() -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path: PathBuf::from("/tmp/beacon-test.redb"),
            tombstone_ttl: Duration::from_secs(900),
            tombstone_granularity: Duration::from_secs(30),
            persist_interval: Duration::from_secs(60),
            event_buffer: 64,
        }
    }
}

fn positive_secs(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::Invalid(var, "must be a positive number of seconds")),
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variable_uses_default() {
        // the process environment is shared between tests
        assert_eq!(positive_secs("BEACON_TEST_UNSET_VARIABLE", 42).unwrap(), 42);
    }

    #[test]
    fn test_gc_config_from_testing_config() {
        let config = Config::for_testing();
        let gc = config.gc_config();
        assert_eq!(gc.ttl, Duration::from_secs(900));
        assert_eq!(gc.granularity, Duration::from_secs(30));
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::Invalid("BEACON_EVENT_BUFFER", "must be a positive integer");
        assert_eq!(
            err.to_string(),
            "Invalid value for BEACON_EVENT_BUFFER: must be a positive integer"
        );
    }
}
