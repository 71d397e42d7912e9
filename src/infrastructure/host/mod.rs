//! Host built from configuration

use std::collections::HashSet;

use crate::application::errors::ConfigError;
use crate::domain::traits::Host;
use crate::infrastructure::config::Config;

/// Static description of the running bot
#[derive(Debug, Clone)]
pub struct ConfigHost {
    version: semver::Version,
    loading_enabled: bool,
    builtin_units: HashSet<String>,
}

impl ConfigHost {
    pub fn new(
        version: semver::Version,
        loading_enabled: bool,
        builtin_units: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            version,
            loading_enabled,
            builtin_units: builtin_units.into_iter().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let version = config
            .host
            .version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"));
        let version = semver::Version::parse(version)
            .map_err(|e| ConfigError::InvalidValue(format!("host version '{}': {}", version, e)))?;

        Ok(Self::new(
            version,
            config.plugins.enabled,
            config.host.builtin_units.iter().cloned(),
        ))
    }
}

impl Host for ConfigHost {
    fn version(&self) -> &semver::Version {
        &self.version
    }

    fn extension_loading_enabled(&self) -> bool {
        self.loading_enabled
    }

    fn has_builtin_unit(&self, name: &str) -> bool {
        self.builtin_units.contains(name)
    }
}
