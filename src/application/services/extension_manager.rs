//! Extension manager - install, remove, update and list plugins
//!
//! Operations on one plugin are serialized through a per-plugin lock; unrelated
//! plugins download, install and load concurrently. The configured and loaded
//! sets are only locked while they are mutated, never across network or
//! subprocess waits.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use super::dependencies::DependencyInstaller;
use super::lifecycle::LifecycleManager;
use super::readiness::ReadinessGate;
use super::resolver::Resolver;
use crate::application::errors::{ExtensionError, LoadError, ResolutionError, StateError};
use crate::domain::entities::{PluginRef, RegistryEntry, RegistryListing, RegistryStatus};
use crate::domain::traits::{Host, PluginStore};
use crate::infrastructure::fetcher::Fetcher;
use crate::infrastructure::registry::RegistryClient;

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Downloaded, dependencies installed and loaded
    Loaded(PluginRef),
    /// Downloaded and configured; loading is disabled on this host
    InstalledNotLoaded(PluginRef),
}

impl InstallOutcome {
    pub fn plugin(&self) -> &PluginRef {
        match self {
            InstallOutcome::Loaded(plugin) | InstallOutcome::InstalledNotLoaded(plugin) => plugin,
        }
    }
}

/// Outcome of updating one configured plugin
#[derive(Debug)]
pub struct UpdateReport {
    /// The configured identifier that was updated
    pub plugin: String,
    pub result: Result<PluginRef, ExtensionError>,
}

/// What the startup pass did
#[derive(Debug, Default)]
pub struct StartupReport {
    pub loaded: Vec<PluginRef>,
    pub failed: Vec<(PluginRef, ExtensionError)>,
    /// Legacy identifiers rewritten to canonical form
    pub migrated: Vec<(String, String)>,
    /// Identifiers that could not be parsed and were dropped
    pub dropped: Vec<String>,
}

/// Owns the plugin state of one host process
pub struct ExtensionManager {
    host: Arc<dyn Host>,
    registry: Arc<RegistryClient>,
    resolver: Resolver,
    fetcher: Fetcher,
    dependencies: DependencyInstaller,
    lifecycle: LifecycleManager,
    store: Arc<dyn PluginStore>,
    configured: tokio::sync::Mutex<Vec<String>>,
    gate: ReadinessGate,
    plugin_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExtensionManager {
    pub fn new(
        host: Arc<dyn Host>,
        registry: Arc<RegistryClient>,
        fetcher: Fetcher,
        dependencies: DependencyInstaller,
        lifecycle: LifecycleManager,
        store: Arc<dyn PluginStore>,
    ) -> Self {
        Self {
            resolver: Resolver::new(registry.clone(), host.clone()),
            host,
            registry,
            fetcher,
            dependencies,
            lifecycle,
            store,
            configured: tokio::sync::Mutex::new(Vec::new()),
            gate: ReadinessGate::new(),
            plugin_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_open()
    }

    /// Canonical identifiers of every configured plugin
    pub async fn configured(&self) -> Vec<String> {
        self.configured.lock().await.clone()
    }

    /// Read the configured plugins, migrate legacy identifiers and load them all.
    ///
    /// A plugin that fails does not stop the others. The readiness gate opens
    /// once every plugin has been attempted.
    pub async fn startup(&self) -> Result<StartupReport, ExtensionError> {
        let stored = self.store.load().await.map_err(ExtensionError::Persist)?;
        let mut report = StartupReport::default();

        let mut canonical: Vec<String> = Vec::with_capacity(stored.len());
        let mut plugins = Vec::with_capacity(stored.len());
        for raw in stored {
            let plugin = match PluginRef::parse_strict(&raw) {
                Ok(plugin) => plugin,
                Err(_) => match PluginRef::parse_lenient(&raw) {
                    Ok(plugin) => {
                        tracing::info!("Migrated legacy plugin name: {}, now {}", raw, plugin);
                        report.migrated.push((raw, plugin.canonical()));
                        plugin
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse plugin name {}: {}", raw, e);
                        report.dropped.push(raw);
                        continue;
                    }
                },
            };

            if !canonical.contains(&plugin.canonical()) {
                canonical.push(plugin.canonical());
                plugins.push(plugin);
            }
        }

        let rewritten = !report.migrated.is_empty() || !report.dropped.is_empty();
        *self.configured.lock().await = canonical.clone();
        if rewritten {
            if let Err(e) = self.store.save(&canonical).await {
                tracing::error!("Failed to persist migrated plugin names: {}", e);
            }
        }

        if self.host.extension_loading_enabled() {
            for plugin in plugins {
                let _guard = self.lock_plugin(&plugin).await;
                match self.fetch_and_activate(&plugin).await {
                    Ok(()) => report.loaded.push(plugin),
                    Err(e) => {
                        tracing::error!("Failed to load {}: {}", plugin, e);
                        report.failed.push((plugin, e));
                    }
                }
            }
        } else {
            tracing::info!("Plugins not loaded since plugin loading is disabled");
        }

        tracing::debug!("Finished loading all plugins");
        self.gate.open();
        Ok(report)
    }

    /// Install a plugin by registry name or `owner/repo/name[@branch]`
    pub async fn install(&self, input: &str) -> Result<InstallOutcome, ExtensionError> {
        self.ensure_ready()?;
        let plugin = self.resolver.resolve(input, true).await?;
        let _guard = self.lock_plugin(&plugin).await;

        if self.is_configured(&plugin).await {
            return Err(StateError::AlreadyInstalled(plugin.canonical()).into());
        }
        if self.host.has_builtin_unit(&plugin.name) {
            return Err(LoadError::NameCollision(plugin.name.clone()).into());
        }

        tracing::info!(
            "Downloading plugin from {}",
            plugin.link(self.fetcher.archive_host())
        );
        let install_dir = self.fetcher.fetch(&plugin, true).await.map_err(|e| {
            tracing::warn!("Unable to download plugin {}: {}", plugin, e);
            e
        })?;

        // A failed load below leaves the plugin configured
        self.add_configured(&plugin).await?;

        if !self.host.extension_loading_enabled() {
            tracing::info!("Installed {}; not loaded since plugin loading is disabled", plugin);
            return Ok(InstallOutcome::InstalledNotLoaded(plugin));
        }

        self.activate(&plugin, &install_dir).await.map_err(|e| {
            tracing::warn!("Unable to load plugin {}: {}", plugin, e);
            e
        })?;
        Ok(InstallOutcome::Loaded(plugin))
    }

    /// Unload a plugin, forget it and delete its files
    pub async fn remove(&self, input: &str) -> Result<PluginRef, ExtensionError> {
        self.ensure_ready()?;
        let plugin = self.resolver.resolve(input, false).await?;
        let _guard = self.lock_plugin(&plugin).await;

        if !self.is_configured(&plugin).await {
            return Err(StateError::NotInstalled(plugin.canonical()).into());
        }

        if !self.lifecycle.unload(&plugin).await? {
            tracing::warn!("Plugin {} was never loaded", plugin);
        }

        self.remove_configured(&plugin).await?;

        let install_dir = self.fetcher.install_dir(&plugin);
        if let Err(e) = tokio::fs::remove_dir_all(&install_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove plugin files {}: {}", plugin, e);
            }
        }
        self.prune_empty_parents(&install_dir).await;

        tracing::info!("Removed plugin {}", plugin);
        Ok(plugin)
    }

    /// Download a configured plugin again and reload it
    pub async fn update(&self, input: &str) -> Result<PluginRef, ExtensionError> {
        self.ensure_ready()?;
        tracing::debug!("Updating {}", input);
        let plugin = self.resolver.resolve(input, true).await?;
        let _guard = self.lock_plugin(&plugin).await;

        if !self.is_configured(&plugin).await {
            return Err(StateError::NotInstalled(plugin.canonical()).into());
        }

        let install_dir = self.fetcher.fetch(&plugin, true).await?;

        if self.host.extension_loading_enabled() {
            let dependencies = &self.dependencies;
            let dir = install_dir.as_path();
            self.lifecycle
                .reload(&plugin, dir, || async move {
                    dependencies
                        .install(dir)
                        .await
                        .map(|_| ())
                        .map_err(ExtensionError::from)
                })
                .await?;
        }

        tracing::debug!("Updated {}", plugin);
        Ok(plugin)
    }

    /// Update every configured plugin; one failure never stops the rest
    pub async fn update_all(&self) -> Result<Vec<UpdateReport>, ExtensionError> {
        self.ensure_ready()?;

        let mut reports = Vec::new();
        for name in self.configured().await {
            let result = self.update(&name).await;
            if let Err(e) = &result {
                tracing::warn!("Failed to update {}: {}", name, e);
            }
            reports.push(UpdateReport { plugin: name, result });
        }
        Ok(reports)
    }

    /// Loaded plugins in display order.
    ///
    /// An empty list means nothing is loaded; a still-running startup pass is
    /// reported as `StateError::StillLoading`.
    pub fn list_loaded(&self) -> Result<Vec<PluginRef>, ExtensionError> {
        if !self.host.extension_loading_enabled() {
            return Err(StateError::LoadingDisabled.into());
        }
        self.ensure_ready()?;
        Ok(self.lifecycle.loaded())
    }

    /// Every registry entry, sorted by name, with its install status
    pub async fn registry_listing(&self) -> Result<Vec<RegistryListing>, ExtensionError> {
        self.refresh_registry().await?;

        let catalog = self.registry.catalog().await;
        let mut entries: Vec<&RegistryEntry> = catalog.values().collect();
        entries.sort_by(|a, b| a.short_name.cmp(&b.short_name));

        Ok(entries.into_iter().map(|entry| self.listing(entry)).collect())
    }

    /// One registry entry with its install status
    pub async fn registry_entry(&self, name: &str) -> Result<RegistryListing, ExtensionError> {
        self.refresh_registry().await?;

        match self.registry.get(name).await {
            Some(entry) => Ok(self.listing(&entry)),
            None => Err(ResolutionError::NotFound {
                name: name.to_string(),
                suggestions: self.registry.suggestions(name).await,
            }
            .into()),
        }
    }

    fn listing(&self, entry: &RegistryEntry) -> RegistryListing {
        let loaded = entry
            .plugin_ref()
            .map(|plugin| self.lifecycle.is_loaded(&plugin))
            .unwrap_or(false);

        let status = if loaded {
            RegistryStatus::Loaded
        } else {
            match self.resolver.check_version(entry) {
                Err(ResolutionError::VersionTooLow { required, .. }) => {
                    RegistryStatus::RequiresVersion(required)
                }
                _ => RegistryStatus::Installable,
            }
        };

        RegistryListing {
            entry: entry.clone(),
            status,
        }
    }

    /// A stale catalog beats no catalog
    async fn refresh_registry(&self) -> Result<(), ExtensionError> {
        if let Err(e) = self.registry.refresh().await {
            if self.registry.catalog().await.is_empty() {
                return Err(e.into());
            }
            tracing::warn!("Using cached registry, refresh failed: {}", e);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), ExtensionError> {
        if self.gate.is_open() {
            Ok(())
        } else {
            Err(StateError::StillLoading.into())
        }
    }

    async fn fetch_and_activate(&self, plugin: &PluginRef) -> Result<(), ExtensionError> {
        let install_dir = self.fetcher.fetch(plugin, false).await?;
        self.activate(plugin, &install_dir).await
    }

    async fn activate(&self, plugin: &PluginRef, install_dir: &Path) -> Result<(), ExtensionError> {
        self.dependencies.install(install_dir).await?;
        self.lifecycle.load(plugin, install_dir).await?;
        Ok(())
    }

    async fn is_configured(&self, plugin: &PluginRef) -> bool {
        self.configured.lock().await.contains(&plugin.canonical())
    }

    async fn add_configured(&self, plugin: &PluginRef) -> Result<(), ExtensionError> {
        let mut configured = self.configured.lock().await;
        let canonical = plugin.canonical();
        if configured.contains(&canonical) {
            return Ok(());
        }

        let mut updated = configured.clone();
        updated.push(canonical);
        self.persist(&updated).await?;
        *configured = updated;
        Ok(())
    }

    async fn remove_configured(&self, plugin: &PluginRef) -> Result<(), ExtensionError> {
        let mut configured = self.configured.lock().await;
        let canonical = plugin.canonical();

        let updated: Vec<String> = configured
            .iter()
            .filter(|name| **name != canonical)
            .cloned()
            .collect();
        self.persist(&updated).await?;
        *configured = updated;
        Ok(())
    }

    /// Disk is written before the in-memory set changes
    async fn persist(&self, plugins: &[String]) -> Result<(), ExtensionError> {
        self.store.save(plugins).await.map_err(|e| {
            tracing::error!("Failed to persist configured plugins: {}", e);
            ExtensionError::Persist(e)
        })
    }

    /// Remove the now-empty repository and owner directories
    async fn prune_empty_parents(&self, install_dir: &Path) {
        let root = self.fetcher.plugins_root();
        for dir in install_dir.ancestors().skip(1).take(2) {
            if dir == root || tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
        }
    }

    async fn lock_plugin(&self, plugin: &PluginRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .plugin_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(plugin.canonical()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
