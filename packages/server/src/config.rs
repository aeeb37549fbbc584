//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `BIND_ADDR` | `127.0.0.1` |
//! | `PORT` | `8080` |
//! | `FOOTPRINTS_PITCH_DEG` | `12.5` |
//! | `FOOTPRINTS_OCCUPANCY_M2` | `41` |
//! | `FOOTPRINTS_TASK_RETENTION_SECS` | `3600` |
//! | `FOOTPRINTS_OVERPASS_TIMEOUT_SECS` | `60` |

use std::str::FromStr;
use std::time::Duration;

use footprints_enrich::EnrichParams;
use footprints_enrich::enrich::{DEFAULT_OCCUPANCY_M2, DEFAULT_PITCH_DEG};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TASK_RETENTION_SECS: u64 = 3600;
const DEFAULT_OVERPASS_TIMEOUT_SECS: u64 = 60;

/// Errors from reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("Invalid value {value:?} for {key}: {message}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Runtime configuration of the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Default estimation parameters for the pipeline and for
    /// `GET /api/buildings` when the query omits them.
    pub params: EnrichParams,
    /// How long finished tasks are kept after their last update.
    pub task_retention: Duration,
    /// Server-side Overpass query timeout.
    pub overpass_timeout: Duration,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value
    /// that cannot be parsed or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if set.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let port = parse_var(&lookup, "PORT", DEFAULT_PORT)?;

        let pitch = parse_var(&lookup, "FOOTPRINTS_PITCH_DEG", DEFAULT_PITCH_DEG)?;
        let occupancy = parse_var(&lookup, "FOOTPRINTS_OCCUPANCY_M2", DEFAULT_OCCUPANCY_M2)?;
        let params = EnrichParams::new(pitch, occupancy).map_err(|e| ConfigError::Invalid {
            key: "FOOTPRINTS_OCCUPANCY_M2",
            value: occupancy.to_string(),
            message: e.to_string(),
        })?;

        let task_retention = Duration::from_secs(parse_var(
            &lookup,
            "FOOTPRINTS_TASK_RETENTION_SECS",
            DEFAULT_TASK_RETENTION_SECS,
        )?);
        let overpass_timeout = Duration::from_secs(parse_var(
            &lookup,
            "FOOTPRINTS_OVERPASS_TIMEOUT_SECS",
            DEFAULT_OVERPASS_TIMEOUT_SECS,
        )?);

        Ok(Self {
            bind_addr,
            port,
            params,
            task_retention,
            overpass_timeout,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                message: e.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.params, EnrichParams::default());
        assert_eq!(config.task_retention, Duration::from_secs(3600));
        assert_eq!(config.overpass_timeout, Duration::from_secs(60));
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("BIND_ADDR", "0.0.0.0"),
            ("PORT", "9000"),
            ("FOOTPRINTS_PITCH_DEG", "30"),
            ("FOOTPRINTS_OCCUPANCY_M2", " 35.5 "),
            ("FOOTPRINTS_OVERPASS_TIMEOUT_SECS", "120"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert!((config.params.pitch_deg() - 30.0).abs() < f64::EPSILON);
        assert!((config.params.occupancy_m2_per_person() - 35.5).abs() < f64::EPSILON);
        assert_eq!(config.overpass_timeout, Duration::from_secs(120));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("FOOTPRINTS_OCCUPANCY_M2", "0")]),
            Err(ConfigError::Invalid {
                key: "FOOTPRINTS_OCCUPANCY_M2",
                ..
            })
        ));
    }
}
