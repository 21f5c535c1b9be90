use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

/// Lowest and highest NTP versions a request header may claim.
pub const MIN_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// `ntpq-embed/config.toml` under the platform config directory, or the
    /// working directory when there is none.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ntpq-embed")
            .join("config.toml")
    }

    /// Load from [`config_path`](Self::config_path). A missing file yields
    /// the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.capacity == 0 {
            return Err(invalid("session.capacity", "must be greater than zero"));
        }
        if self.session.output_size == 0 {
            return Err(invalid("session.output_size", "must be greater than zero"));
        }

        let version = self.engine.version;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(invalid(
                "engine.version",
                format!("{} outside {}..={}", version, MIN_VERSION, MAX_VERSION),
            ));
        }

        if self.engine.timeout_ms == 0 {
            return Err(invalid("engine.timeout_ms", "must be greater than zero"));
        }
        if self.engine.secondary_timeout_ms == 0 {
            return Err(invalid(
                "engine.secondary_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
