//! Application layer errors

use thiserror::Error;

/// Maximum number of characters of installer output shown in error messages
const MAX_DISPLAY_CHARS: usize = 1000;

/// Top-level error for every extension manager operation
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Dependency install error: {0}")]
    DependencyInstall(#[from] DependencyInstallError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("{0}")]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to persist configured plugins: {0}")]
    Persist(#[source] StorageError),
}

impl ExtensionError {
    /// True when the error only means the readiness gate is still closed
    pub fn is_still_loading(&self) -> bool {
        matches!(self, ExtensionError::State(StateError::StillLoading))
    }
}

/// Turning user input into a plugin reference
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid plugin name '{0}', expected owner/repo/plugin or owner/repo/plugin@branch")]
    InvalidFormat(String),

    #[error("Host version {host} is too low, plugin requires {required}")]
    VersionTooLow { required: String, host: String },

    #[error("No plugin named '{name}' in the registry{}", suggestion_suffix(.suggestions))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (perhaps you meant: {})", suggestions.join(", "))
    }
}

/// Registry catalog refresh failures
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed registry response: {0}")]
    MalformedResponse(String),
}

/// Archive download failures
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Server returned {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to write cache entry: {0}")]
    CacheWriteFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Archive extraction failures
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Archive has no '{0}' directory")]
    MissingPluginSubtree(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dependency installer subprocess failures
#[derive(Error, Debug)]
pub enum DependencyInstallError {
    #[error("Installer exited with {}: {}", exit_label(.code), truncate(.stderr, MAX_DISPLAY_CHARS))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Failed to spawn installer: {0}")]
    Spawn(String),

    #[error("Installer timed out after {0}s")]
    TimedOut(u64),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

/// Code unit load/unload failures
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error("Entry point not found: {0}")]
    MissingEntryPoint(String),

    #[error("Another extension named '{0}' is already registered")]
    NameCollision(String),

    #[error("Initialization failed: {0}")]
    InitializationFailure(String),
}

/// Operation rejected because of the current plugin state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Plugin {0} is already installed")]
    AlreadyInstalled(String),

    #[error("Plugin {0} is not installed")]
    NotInstalled(String),

    #[error("Plugins are still loading, please try again later")]
    StillLoading,

    #[error("Plugin loading is disabled")]
    LoadingDisabled,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Shorten `text` to at most `max` characters, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
