//! Code loaders
//!
//! `DylibLoader` loads plugins as shared libraries exporting `carik_plugin_entry`.
//! `RecordingLoader` only records calls, for dry runs and tests.

pub mod dylib;
pub mod recording;

pub use dylib::{DylibLoader, Extension, ExtensionEntryFn, ENTRY_SYMBOL};
pub use recording::{LoaderCall, RecordingLoader};

/// File extension of a plugin's entry file on this platform
pub fn entry_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}
