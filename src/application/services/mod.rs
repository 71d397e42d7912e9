//! Application services

pub mod dependencies;
pub mod extension_manager;
pub mod lifecycle;
pub mod readiness;
pub mod resolver;

pub use dependencies::DependencyInstaller;
pub use extension_manager::{ExtensionManager, InstallOutcome, StartupReport, UpdateReport};
pub use lifecycle::{LifecycleManager, PluginState};
pub use readiness::ReadinessGate;
pub use resolver::{parse_version, Resolver};
