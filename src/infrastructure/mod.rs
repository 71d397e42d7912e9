//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading and the configured plugin store
//! - Http, Registry, Cache, Fetcher: Remote catalog and archive handling
//! - Process: Subprocess execution
//! - Loader: Dynamic code loading
//! - Host: The bot as seen by the extension manager

pub mod cache;
pub mod config;
pub mod fetcher;
pub mod host;
pub mod http;
pub mod loader;
pub mod process;
pub mod registry;
