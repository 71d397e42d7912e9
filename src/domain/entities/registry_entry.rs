//! Registry catalog rows

use serde::{Deserialize, Serialize};

use super::plugin_ref::PluginRef;
use crate::application::errors::ResolutionError;

/// A published plugin, as listed in the remote registry document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistryEntry {
    /// Catalog key; filled in from the document's object key
    #[serde(skip)]
    pub short_name: String,

    /// `owner/repo`
    pub repository: String,

    #[serde(default)]
    pub branch: Option<String>,

    /// Minimum host version, as a semantic version string
    #[serde(default, rename = "bot_version")]
    pub min_host_version: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub icon_url: Option<String>,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,
}

impl RegistryEntry {
    /// The plugin this entry points at
    pub fn plugin_ref(&self) -> Result<PluginRef, ResolutionError> {
        PluginRef::from_repository(&self.repository, &self.short_name, self.branch.clone())
    }
}

/// Install eligibility of a registry entry for this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryStatus {
    /// Currently active in the process
    Loaded,
    /// Can be installed on this host
    Installable,
    /// Needs at least the given host version
    RequiresVersion(String),
}

/// One row of a registry listing
#[derive(Debug, Clone)]
pub struct RegistryListing {
    pub entry: RegistryEntry,
    pub status: RegistryStatus,
}
