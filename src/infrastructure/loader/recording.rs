//! Recording loader - tracks load/unload calls without running any plugin code

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::application::errors::LoadError;
use crate::domain::entities::CodeUnit;
use crate::domain::traits::CodeLoader;

/// A call made against the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderCall {
    Load(String),
    Unload(String),
}

#[derive(Default)]
struct State {
    calls: Vec<LoaderCall>,
    active: HashSet<String>,
    failing: HashSet<String>,
    search_paths: Vec<PathBuf>,
}

/// In-memory loader for dry runs and tests
#[derive(Default)]
pub struct RecordingLoader {
    state: Mutex<State>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future load of `id` fail with an initialization error
    pub fn fail_on(&self, id: impl Into<String>) {
        self.state().failing.insert(id.into());
    }

    pub fn calls(&self) -> Vec<LoaderCall> {
        self.state().calls.clone()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.state().active.contains(id)
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.state().search_paths.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CodeLoader for RecordingLoader {
    fn load(&self, unit: &CodeUnit) -> Result<(), LoadError> {
        let mut state = self.state();
        state.calls.push(LoaderCall::Load(unit.id.clone()));

        if state.failing.contains(&unit.id) {
            return Err(LoadError::InitializationFailure(format!(
                "{} raised during setup",
                unit.name
            )));
        }
        state.active.insert(unit.id.clone());
        Ok(())
    }

    fn unload(&self, id: &str) -> Result<bool, LoadError> {
        let mut state = self.state();
        state.calls.push(LoaderCall::Unload(id.to_string()));
        Ok(state.active.remove(id))
    }

    fn add_search_path(&self, path: &Path) -> Result<(), LoadError> {
        self.state().search_paths.push(path.to_path_buf());
        Ok(())
    }
}
