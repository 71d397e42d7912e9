//! Configuration management

pub mod store;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;
use crate::domain::entities::DEFAULT_ARCHIVE_HOST;

pub use store::{MemoryPluginStore, YamlPluginStore};

/// Registry published alongside the bot
pub const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/kyb3r/modmail/master/plugins/registry.json";

/// Extension manager configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub host: HostConfig,
    pub plugins: PluginConfig,
    pub dependencies: DependencyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostConfig {
    pub name: String,
    /// Overrides the compiled-in version when comparing against registry minimums
    #[serde(default)]
    pub version: Option<String>,
    /// Names owned by built-in units; plugins may not reuse them
    #[serde(default)]
    pub builtin_units: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub cache_directory: PathBuf,
    pub registry_url: String,
    pub archive_host: String,
    /// Where the configured plugin list is persisted
    pub state_file: PathBuf,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyConfig {
    /// Manifest file looked up in each install directory
    pub manifest: String,
    pub program: String,
    /// Installer arguments; the manifest path is appended
    pub args: Vec<String>,
    /// Installer's user-local package directory
    #[serde(default)]
    pub package_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: HostConfig {
                name: "carik-bot".to_string(),
                version: None,
                builtin_units: vec![
                    "core".to_string(),
                    "modmail".to_string(),
                    "plugins".to_string(),
                    "utility".to_string(),
                ],
            },
            plugins: PluginConfig {
                enabled: true,
                directory: PathBuf::from("./plugins"),
                cache_directory: PathBuf::from("./temp/plugins-cache"),
                registry_url: DEFAULT_REGISTRY_URL.to_string(),
                archive_host: DEFAULT_ARCHIVE_HOST.to_string(),
                state_file: PathBuf::from("./plugins.yaml"),
                http_timeout_secs: 30,
            },
            dependencies: DependencyConfig {
                manifest: "requirements.txt".to_string(),
                program: "pip".to_string(),
                args: vec![
                    "install".to_string(),
                    "--upgrade".to_string(),
                    "--user".to_string(),
                    "-q".to_string(),
                    "-q".to_string(),
                    "-r".to_string(),
                ],
                package_dir: None,
                timeout_secs: Some(300),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Environment variables win over file values
    pub fn apply_env(&mut self) {
        if let Ok(enabled) = std::env::var("ENABLE_PLUGINS") {
            self.plugins.enabled = parse_flag(&enabled);
        }

        if let Ok(url) = std::env::var("PLUGIN_REGISTRY_URL") {
            self.plugins.registry_url = url;
        }

        if let Ok(dir) = std::env::var("PLUGIN_DIR") {
            self.plugins.directory = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plugins.registry_url.trim().is_empty() {
            return Err(ConfigError::MissingField("plugins.registry-url".to_string()));
        }
        if self.dependencies.program.trim().is_empty() {
            return Err(ConfigError::MissingField("dependencies.program".to_string()));
        }
        if let Some(version) = &self.host.version {
            semver::Version::parse(version).map_err(|e| {
                ConfigError::InvalidValue(format!("host.version '{}': {}", version, e))
            })?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips_through_yaml() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("registry-url"));
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.plugins.enabled);
        assert_eq!(parsed.dependencies.manifest, "requirements.txt");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("FALSE"));
        assert!(!parse_flag(" no "));
    }

    #[test]
    fn test_validate_rejects_bad_host_version() {
        let mut config = Config::default();
        config.host.version = Some("three".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.plugins.enabled = false;
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.plugins.enabled);
    }
}
