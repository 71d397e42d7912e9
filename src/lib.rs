//! Extension manager for carik-bot
//!
//! Resolves third-party plugin identifiers, downloads and caches their source
//! archives, installs declared dependencies and loads the result into the
//! running bot.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::errors::ExtensionError;
pub use application::services::{ExtensionManager, InstallOutcome, StartupReport, UpdateReport};
pub use domain::entities::PluginRef;
