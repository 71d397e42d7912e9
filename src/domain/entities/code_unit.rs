use std::path::PathBuf;

use super::plugin_ref::PluginRef;

/// What a code loader needs to bring one plugin into the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    /// Logical extension identifier
    pub id: String,
    /// Declared plugin name
    pub name: String,
    /// Entry file inside the install directory
    pub entry: PathBuf,
}

impl CodeUnit {
    pub fn for_plugin(plugin: &PluginRef, entry: PathBuf) -> Self {
        Self {
            id: plugin.extension_id(),
            name: plugin.name.clone(),
            entry,
        }
    }
}
