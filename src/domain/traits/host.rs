/// Host trait - what the running bot exposes to the extension manager
pub trait Host: Send + Sync {
    /// Version of the host, compared against registry minimums
    fn version(&self) -> &semver::Version;

    /// Whether extension loading is globally enabled
    fn extension_loading_enabled(&self) -> bool;

    /// True when a built-in (non-plugin) unit already uses this name
    fn has_builtin_unit(&self, name: &str) -> bool;
}
