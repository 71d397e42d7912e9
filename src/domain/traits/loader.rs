use std::path::Path;

use crate::application::errors::LoadError;
use crate::domain::entities::CodeUnit;

/// CodeLoader trait - brings code units into and out of the running process
pub trait CodeLoader: Send + Sync {
    /// Load and initialize the unit; on error nothing stays registered
    fn load(&self, unit: &CodeUnit) -> Result<(), LoadError>;

    /// Remove the unit; returns false when it was not loaded
    fn unload(&self, id: &str) -> Result<bool, LoadError>;

    /// Make a directory of freshly installed dependencies visible to later loads
    fn add_search_path(&self, _path: &Path) -> Result<(), LoadError> {
        Ok(())
    }
}
