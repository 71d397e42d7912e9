//! Dylib loader - brings plugins into the process as shared libraries

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use libloading::{Library, Symbol};

use crate::application::errors::LoadError;
use crate::domain::entities::CodeUnit;
use crate::domain::traits::CodeLoader;

/// Symbol every plugin library exports
pub const ENTRY_SYMBOL: &[u8] = b"carik_plugin_entry";

/// Function signature of the entry symbol; returns a `Box<Box<dyn Extension>>` as a raw pointer
pub type ExtensionEntryFn = unsafe extern "C" fn() -> *mut Box<dyn Extension>;

/// Trait every plugin library implements
pub trait Extension: Send + Sync {
    /// Get plugin name
    fn name(&self) -> &str;

    /// Get plugin version
    fn version(&self) -> &str;

    /// Initialize the plugin
    fn init(&self) -> Result<(), String>;

    /// Clean up resources when plugin is unloaded
    fn shutdown(&self) -> Result<(), String>;
}

/// A loaded library and the extension it produced.
///
/// Field order matters: the instance must be dropped before its library.
struct LoadedUnit {
    instance: Arc<dyn Extension>,
    #[allow(dead_code)]
    library: Library,
}

/// Loads code units from shared libraries with libloading
#[derive(Default)]
pub struct DylibLoader {
    units: Mutex<HashMap<String, LoadedUnit>>,
    search_paths: Mutex<Vec<PathBuf>>,
    preloaded: Mutex<HashMap<PathBuf, Library>>,
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of loaded units
    pub fn loaded_ids(&self) -> Vec<String> {
        lock(&self.units).keys().cloned().collect()
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        lock(&self.search_paths).clone()
    }

    /// Open every shared library in the search paths that is not open yet
    fn preload_dependencies(&self) {
        let dirs = self.search_paths();
        let mut preloaded = lock(&self.preloaded);

        for dir in dirs {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_shared_library(&path) || preloaded.contains_key(&path) {
                    continue;
                }
                match open_global(&path) {
                    Ok(library) => {
                        tracing::debug!("Preloaded dependency {}", path.display());
                        preloaded.insert(path, library);
                    }
                    Err(e) => tracing::warn!("Failed to preload {}: {}", path.display(), e),
                }
            }
        }
    }
}

impl CodeLoader for DylibLoader {
    fn load(&self, unit: &CodeUnit) -> Result<(), LoadError> {
        if lock(&self.units).contains_key(&unit.id) {
            return Err(LoadError::NameCollision(unit.name.clone()));
        }

        self.preload_dependencies();

        // Load the library
        let library = unsafe {
            Library::new(&unit.entry).map_err(|e| {
                LoadError::InitializationFailure(format!("Failed to load library: {}", e))
            })?
        };

        // Get the entry function
        let instance: Arc<dyn Extension> = unsafe {
            let entry_fn: Symbol<ExtensionEntryFn> = library.get(ENTRY_SYMBOL).map_err(|e| {
                LoadError::InitializationFailure(format!("Failed to find entry function: {}", e))
            })?;

            let raw = entry_fn();
            if raw.is_null() {
                return Err(LoadError::InitializationFailure(
                    "Plugin entry returned null".to_string(),
                ));
            }
            Arc::from(*Box::from_raw(raw))
        };

        instance
            .init()
            .map_err(|e| LoadError::InitializationFailure(format!("Plugin init failed: {}", e)))?;

        tracing::info!(
            "Loaded extension {} ({} v{})",
            unit.id,
            instance.name(),
            instance.version()
        );

        lock(&self.units).insert(unit.id.clone(), LoadedUnit { instance, library });
        Ok(())
    }

    fn unload(&self, id: &str) -> Result<bool, LoadError> {
        let Some(unit) = lock(&self.units).remove(id) else {
            return Ok(false);
        };

        if let Err(e) = unit.instance.shutdown() {
            tracing::warn!("Extension {} failed to shut down cleanly: {}", id, e);
        }
        drop(unit);

        tracing::info!("Unloaded extension {}", id);
        Ok(true)
    }

    fn add_search_path(&self, path: &Path) -> Result<(), LoadError> {
        let mut paths = lock(&self.search_paths);
        if !paths.iter().any(|p| p == path) {
            paths.insert(0, path.to_path_buf());
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_shared_library(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
}

/// Open a library so its symbols satisfy libraries loaded afterwards
#[cfg(unix)]
fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL)? };
    Ok(library.into())
}

#[cfg(not(unix))]
fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}
