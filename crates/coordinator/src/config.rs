//! # Configuration Loading
//!
//! [`GateKeeperConfig`] is assembled in three layers:
//!
//! 1. Built-in defaults
//! 2. Optional TOML file (unknown keys are an error)
//! 3. `FLEETGATE_*` environment variables
//!
//! and validated last. Loading does no other I/O.
//!
//! ## Environment variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FLEETGATE_RESERVED_ID` | `reserved_identifier` |
//! | `FLEETGATE_ID_PATTERN` | `identifier_pattern` |
//! | `FLEETGATE_CREDENTIALS_PATH` | `credentials_path` |
//! | `FLEETGATE_INVENTORY_API` | `inventory_api_base` |
//! | `FLEETGATE_INVENTORY_TIMEOUT_SECS` | `inventory_timeout_secs` |
//! | `FLEETGATE_KEY_STORE_TIMEOUT_SECS` | `key_store_timeout_secs` |
//! | `FLEETGATE_IDENTITY_TIMEOUT_SECS` | `identity_query_timeout_secs` |
//! | `FLEETGATE_CONFIRM_ATTEMPTS` | `confirm_attempts` |
//! | `FLEETGATE_CONFIRM_INTERVAL_MS` | `confirm_interval_ms` |
//! | `FLEETGATE_INSTANCE_GRAIN` | `instance_id_grain` |
//! | `FLEETGATE_SALT_KEY_BIN` | `salt_key_bin` |
//! | `FLEETGATE_SALT_BIN` | `salt_bin` |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::gatekeeper::GateKeeperConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{var} invalid: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("identifier pattern does not compile: {0}")]
    InvalidPattern(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Defaults, then `path` (if any), then the process environment.
pub fn load_config(path: Option<&Path>) -> Result<GateKeeperConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let config = from_toml_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(path = %path.display(), "loaded config file");
            config
        }
        None => GateKeeperConfig::default(),
    };

    apply_env(&mut config, |var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}

pub fn from_toml_str(raw: &str) -> Result<GateKeeperConfig, toml::de::Error> {
    toml::from_str(raw)
}

/// Applies `FLEETGATE_*` overrides read through `lookup`.
pub fn apply_env<F>(config: &mut GateKeeperConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("FLEETGATE_RESERVED_ID") {
        config.reserved_identifier = v;
    }
    if let Some(v) = lookup("FLEETGATE_ID_PATTERN") {
        config.identifier_pattern = v;
    }
    if let Some(v) = lookup("FLEETGATE_CREDENTIALS_PATH") {
        config.credentials_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("FLEETGATE_INVENTORY_API") {
        config.inventory_api_base = v;
    }
    if let Some(v) = lookup("FLEETGATE_INSTANCE_GRAIN") {
        config.instance_id_grain = v;
    }
    if let Some(v) = lookup("FLEETGATE_SALT_KEY_BIN") {
        config.salt_key_bin = v;
    }
    if let Some(v) = lookup("FLEETGATE_SALT_BIN") {
        config.salt_bin = v;
    }

    parse_into(&lookup, "FLEETGATE_INVENTORY_TIMEOUT_SECS", &mut config.inventory_timeout_secs)?;
    parse_into(&lookup, "FLEETGATE_KEY_STORE_TIMEOUT_SECS", &mut config.key_store_timeout_secs)?;
    parse_into(
        &lookup,
        "FLEETGATE_IDENTITY_TIMEOUT_SECS",
        &mut config.identity_query_timeout_secs,
    )?;
    parse_into(&lookup, "FLEETGATE_CONFIRM_ATTEMPTS", &mut config.confirm_attempts)?;
    parse_into(&lookup, "FLEETGATE_CONFIRM_INTERVAL_MS", &mut config.confirm_interval_ms)?;
    Ok(())
}

fn parse_into<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value.trim().parse().map_err(|_| ConfigError::Env {
            var,
            value: value.clone(),
        })?;
    }
    Ok(())
}

impl GateKeeperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reserved_identifier.trim().is_empty() {
            return Err(ConfigError::Invalid("reserved_identifier is empty".into()));
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("credentials_path is empty".into()));
        }
        if self.confirm_attempts == 0 {
            return Err(ConfigError::Invalid("confirm_attempts must be at least 1".into()));
        }
        if self.inventory_timeout_secs == 0
            || self.key_store_timeout_secs == 0
            || self.identity_query_timeout_secs == 0
        {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.instance_id_grain.trim().is_empty() {
            return Err(ConfigError::Invalid("instance_id_grain is empty".into()));
        }
        if self.salt_key_bin.is_empty() || self.salt_bin.is_empty() {
            return Err(ConfigError::Invalid("tool binaries must be set".into()));
        }
        self.identity_policy().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GateKeeperConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reserved_identifier, "production-control-plane");
        assert_eq!(config.confirm_attempts, 3);
        assert_eq!(config.poll_schedule().interval.as_millis(), 2000);
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let config = from_toml_str(
            r#"
            confirm_attempts = 5
            inventory_api_base = "http://127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.confirm_attempts, 5);
        assert_eq!(config.inventory_api_base, "http://127.0.0.1:9000");
        assert_eq!(config.salt_key_bin, "salt-key");
    }

    #[test]
    fn unknown_toml_key_is_rejected() {
        assert!(from_toml_str("confirm_attemps = 5").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "confirm_attempts = 5\nsalt_bin = \"/opt/salt/bin/salt\"").unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        let mut config = from_toml_str(&raw).unwrap();
        apply_env(
            &mut config,
            env(&[
                ("FLEETGATE_CONFIRM_ATTEMPTS", "7"),
                ("FLEETGATE_CREDENTIALS_PATH", "/tmp/creds.json"),
            ]),
        )
        .unwrap();

        assert_eq!(config.confirm_attempts, 7);
        assert_eq!(config.salt_bin, "/opt/salt/bin/salt");
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/creds.json"));
    }

    #[test]
    fn bad_env_number_names_the_variable() {
        let mut config = GateKeeperConfig::default();
        let err = apply_env(&mut config, env(&[("FLEETGATE_CONFIRM_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("FLEETGATE_CONFIRM_INTERVAL_MS"));
    }

    #[test]
    fn validation_rules() {
        let bad = [
            GateKeeperConfig {
                confirm_attempts: 0,
                ..GateKeeperConfig::default()
            },
            GateKeeperConfig {
                reserved_identifier: " ".into(),
                ..GateKeeperConfig::default()
            },
            GateKeeperConfig {
                identifier_pattern: "(".into(),
                ..GateKeeperConfig::default()
            },
            GateKeeperConfig {
                inventory_timeout_secs: 0,
                ..GateKeeperConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_config_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "confirm_attempts = \"three\"").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
