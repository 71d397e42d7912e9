//! Lifecycle manager - the authoritative set of loaded plugins

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::application::errors::{ExtensionError, LoadError};
use crate::domain::entities::{sort_for_display, CodeUnit, PluginRef};
use crate::domain::traits::{CodeLoader, Host};

/// Load state of one plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
}

/// Tracks which plugins are active and drives the code loader
pub struct LifecycleManager {
    loader: Arc<dyn CodeLoader>,
    host: Arc<dyn Host>,
    entry_extension: String,
    states: Mutex<HashMap<PluginRef, PluginState>>,
}

impl LifecycleManager {
    pub fn new(
        loader: Arc<dyn CodeLoader>,
        host: Arc<dyn Host>,
        entry_extension: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            host,
            entry_extension: entry_extension.into(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Entry file the plugin must ship
    pub fn entry_point(&self, plugin: &PluginRef, install_dir: &Path) -> PathBuf {
        install_dir.join(format!("{}.{}", plugin.name, self.entry_extension))
    }

    pub fn state(&self, plugin: &PluginRef) -> PluginState {
        self.states()
            .get(plugin)
            .copied()
            .unwrap_or(PluginState::Unloaded)
    }

    pub fn is_loaded(&self, plugin: &PluginRef) -> bool {
        self.state(plugin) == PluginState::Loaded
    }

    /// Loaded plugins in display order
    pub fn loaded(&self) -> Vec<PluginRef> {
        let mut loaded: Vec<PluginRef> = self
            .states()
            .iter()
            .filter(|(_, state)| **state == PluginState::Loaded)
            .map(|(plugin, _)| plugin.clone())
            .collect();
        sort_for_display(&mut loaded);
        loaded
    }

    /// Load the plugin from its install directory.
    ///
    /// The plugin joins the loaded set only if the loader succeeds.
    pub async fn load(&self, plugin: &PluginRef, install_dir: &Path) -> Result<(), LoadError> {
        let entry = self.entry_point(plugin, install_dir);
        if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
            return Err(LoadError::MissingEntryPoint(entry.display().to_string()));
        }

        {
            let mut states = self.states();
            match states.get(plugin) {
                Some(PluginState::Loaded) => {
                    tracing::debug!("Plugin {} is already loaded", plugin);
                    return Ok(());
                }
                Some(PluginState::Loading) => {
                    return Err(LoadError::InitializationFailure(format!(
                        "{} is already being loaded",
                        plugin
                    )));
                }
                _ => {}
            }

            let taken = self.host.has_builtin_unit(&plugin.name)
                || states.iter().any(|(other, state)| {
                    other != plugin
                        && other.name == plugin.name
                        && *state != PluginState::Unloaded
                });
            if taken {
                return Err(LoadError::NameCollision(plugin.name.clone()));
            }

            states.insert(plugin.clone(), PluginState::Loading);
        }

        let unit = CodeUnit::for_plugin(plugin, entry);
        let id = unit.id.clone();
        let loader = self.loader.clone();
        let result = tokio::task::spawn_blocking(move || loader.load(&unit))
            .await
            .unwrap_or_else(|e| Err(task_failed(e)));

        let mut states = self.states();
        match result {
            Ok(()) => {
                states.insert(plugin.clone(), PluginState::Loaded);
                tracing::info!("Plugin \"{}\" loaded", plugin.name);
                Ok(())
            }
            Err(e) => {
                states.remove(plugin);
                tracing::error!("Failed to load plugin {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Unload the plugin; returns false when it was not loaded
    pub async fn unload(&self, plugin: &PluginRef) -> Result<bool, LoadError> {
        if !self.is_loaded(plugin) {
            return Ok(false);
        }

        let id = plugin.extension_id();
        let loader = self.loader.clone();
        tokio::task::spawn_blocking(move || loader.unload(&id))
            .await
            .map_err(task_failed)??;
        self.states().remove(plugin);
        tracing::info!("Plugin \"{}\" unloaded", plugin.name);
        Ok(true)
    }

    /// Unload if loaded, run `prepare`, then load again.
    ///
    /// A failed unload stops here and the old code stays loaded. If anything
    /// after the unload fails the plugin stays unloaded.
    pub async fn reload<F, Fut>(
        &self,
        plugin: &PluginRef,
        install_dir: &Path,
        prepare: F,
    ) -> Result<(), ExtensionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ExtensionError>>,
    {
        self.unload(plugin).await.map_err(|e| {
            tracing::warn!("Plugin {} failed to unload: {}", plugin, e);
            e
        })?;

        prepare().await?;
        self.load(plugin, install_dir).await?;
        Ok(())
    }

    fn states(&self) -> MutexGuard<'_, HashMap<PluginRef, PluginState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn task_failed(e: tokio::task::JoinError) -> LoadError {
    LoadError::InitializationFailure(format!("Loader task failed: {}", e))
}
