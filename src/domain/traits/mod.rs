//! Domain traits - Abstractions for the host and infrastructure implementations

pub mod host;
pub mod http;
pub mod loader;
pub mod process;
pub mod store;

pub use host::Host;
pub use http::HttpClient;
pub use loader::CodeLoader;
pub use process::{CommandRunner, ProcessOutput};
pub use store::PluginStore;
