//! Resolver - turns user input into a plugin reference

use std::sync::Arc;

use semver::Version;

use crate::application::errors::ResolutionError;
use crate::domain::entities::{PluginRef, RegistryEntry};
use crate::domain::traits::Host;
use crate::infrastructure::registry::RegistryClient;

/// Resolves registry short names and free-text `owner/repo/name[@branch]` input
pub struct Resolver {
    registry: Arc<RegistryClient>,
    host: Arc<dyn Host>,
}

impl Resolver {
    pub fn new(registry: Arc<RegistryClient>, host: Arc<dyn Host>) -> Self {
        Self { registry, host }
    }

    /// Resolve `input` against the current catalog, falling back to free-text parsing.
    ///
    /// With `check_version` a registry entry whose minimum version exceeds the
    /// host's is rejected before anything is downloaded.
    pub async fn resolve(&self, input: &str, check_version: bool) -> Result<PluginRef, ResolutionError> {
        let input = input.trim();

        if let Some(entry) = self.registry.get(input).await {
            if check_version {
                self.check_version(&entry)?;
            }
            return entry.plugin_ref();
        }

        PluginRef::parse_lenient(input)
    }

    /// Fails when the entry needs a newer host
    pub fn check_version(&self, entry: &RegistryEntry) -> Result<(), ResolutionError> {
        let Some(required) = entry.min_host_version.as_deref() else {
            return Ok(());
        };

        let Some(minimum) = parse_version(required) else {
            tracing::warn!(
                "Ignoring unparseable minimum version '{}' of {}",
                required,
                entry.short_name
            );
            return Ok(());
        };

        let host = self.host.version();
        if *host < minimum {
            return Err(ResolutionError::VersionTooLow {
                required: required.to_string(),
                host: host.to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a version the way registry authors write them: `3.4`, `v3.4.1`, `3.4.1-beta`
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(parts) {
        *slot = part.parse().ok()?;
    }
    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}
