//! Domain entities

pub mod code_unit;
pub mod plugin_ref;
pub mod registry_entry;

pub use code_unit::CodeUnit;
pub use plugin_ref::{sort_for_display, PluginRef, DEFAULT_ARCHIVE_HOST, DEFAULT_BRANCH};
pub use registry_entry::{RegistryEntry, RegistryListing, RegistryStatus};
