//! Shared fixtures for the extension manager integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use zip::write::SimpleFileOptions;

use carik_plugins::application::errors::{DependencyInstallError, DownloadError};
use carik_plugins::application::services::{DependencyInstaller, ExtensionManager, LifecycleManager};
use carik_plugins::domain::entities::PluginRef;
use carik_plugins::domain::traits::{CommandRunner, HttpClient, ProcessOutput};
use carik_plugins::infrastructure::cache::ArtifactCache;
use carik_plugins::infrastructure::config::MemoryPluginStore;
use carik_plugins::infrastructure::fetcher::Fetcher;
use carik_plugins::infrastructure::host::ConfigHost;
use carik_plugins::infrastructure::loader::RecordingLoader;
use carik_plugins::infrastructure::registry::RegistryClient;

pub const REGISTRY_URL: &str = "https://registry.test/registry.json";
pub const ARCHIVE_HOST: &str = "archive.test";
pub const ENTRY_EXTENSION: &str = "so";

/// Serves canned bodies and counts every request per URL
#[derive(Default)]
pub struct CountingHttp {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingHttp {
    pub fn serve(&self, url: impl Into<String>, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.into(), body);
    }

    pub fn take_down(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Requests for anything other than the registry document
    pub fn archive_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.as_str() != REGISTRY_URL)
            .map(|(_, count)| count)
            .sum()
    }
}

#[async_trait]
impl HttpClient for CountingHttp {
    async fn get(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Installer stand-in; fails for any install directory containing a scripted marker
#[derive(Default)]
pub struct ScriptedRunner {
    failing: Mutex<Vec<String>>,
    runs: Mutex<Vec<PathBuf>>,
}

impl ScriptedRunner {
    pub fn fail_for(&self, marker: impl Into<String>) {
        self.failing.lock().unwrap().push(marker.into());
    }

    pub fn runs(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        _program: &str,
        _args: &[String],
        cwd: &Path,
    ) -> Result<ProcessOutput, DependencyInstallError> {
        self.runs.lock().unwrap().push(cwd.to_path_buf());

        let cwd = cwd.to_string_lossy();
        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|marker| cwd.contains(marker.as_str()));

        Ok(if fails {
            ProcessOutput {
                stdout: String::new(),
                stderr: "ERROR: No matching distribution found for missing-package".to_string(),
                code: Some(1),
            }
        } else {
            ProcessOutput {
                code: Some(0),
                ..ProcessOutput::default()
            }
        })
    }
}

/// Build a repository archive: `(path, content)` pairs, directories end with `/`
pub fn repo_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Archive of `owner/repo@branch` holding one loadable plugin per name.
///
/// A plugin whose name starts with `deps` also ships a requirements file.
pub fn plugins_archive(repository: &str, branch: &str, names: &[&str]) -> Vec<u8> {
    let root = format!("{}-{}", repository, branch);
    let mut entries: Vec<(String, String)> = vec![
        (format!("{}/", root), String::new()),
        (format!("{}/README.md", root), "plugins".to_string()),
    ];
    for name in names {
        entries.push((format!("{}/{}/", root, name), String::new()));
        entries.push((
            format!("{}/{}/{}.{}", root, name, name, ENTRY_EXTENSION),
            format!("{} code", name),
        ));
        if name.starts_with("deps") {
            entries.push((
                format!("{}/{}/requirements.txt", root, name),
                "missing-package==1.0\n".to_string(),
            ));
        }
    }

    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_str()))
        .collect();
    repo_archive(&borrowed)
}

/// How the harness host is set up
pub struct Options {
    pub host_version: semver::Version,
    pub loading_enabled: bool,
    pub stored: Vec<String>,
    pub registry: &'static str,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host_version: semver::Version::new(4, 0, 0),
            loading_enabled: true,
            stored: Vec::new(),
            registry: "{}",
        }
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub http: Arc<CountingHttp>,
    pub runner: Arc<ScriptedRunner>,
    pub loader: Arc<RecordingLoader>,
    pub store: Arc<MemoryPluginStore>,
    pub manager: ExtensionManager,
}

impl Harness {
    pub fn plugins_root(&self) -> PathBuf {
        self.dir.path().join("plugins")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn install_dir(&self, plugin: &PluginRef) -> PathBuf {
        self.plugins_root().join(plugin.relative_path())
    }

    pub fn cache_file(&self, plugin: &PluginRef) -> PathBuf {
        self.cache_root().join(plugin.cache_file_name())
    }

    /// Serve the archive of `owner/repo@branch` from the fake archive host
    pub fn serve_archive(&self, owner: &str, repository: &str, branch: &str, names: &[&str]) -> String {
        let plugin = PluginRef::new(owner, repository, "any", Some(branch.to_string()));
        let url = plugin.archive_url(ARCHIVE_HOST);
        self.http
            .serve(url.clone(), plugins_archive(repository, branch, names));
        url
    }
}

/// A manager wired to in-memory fakes, with its registry already fetched
pub async fn harness(options: Options) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let http = Arc::new(CountingHttp::default());
    http.serve(REGISTRY_URL, options.registry.as_bytes().to_vec());
    let runner = Arc::new(ScriptedRunner::default());
    let loader = Arc::new(RecordingLoader::new());
    let store = Arc::new(MemoryPluginStore::new(options.stored));

    let host = Arc::new(ConfigHost::new(
        options.host_version,
        options.loading_enabled,
        vec!["core".to_string(), "utility".to_string()],
    ));
    let registry = Arc::new(RegistryClient::new(REGISTRY_URL, http.clone()));
    registry.refresh().await.unwrap();

    let fetcher = Fetcher::new(
        dir.path().join("plugins"),
        ARCHIVE_HOST,
        http.clone(),
        ArtifactCache::new(dir.path().join("cache")),
    );
    let dependencies = DependencyInstaller::new(
        runner.clone(),
        loader.clone(),
        "requirements.txt",
        "pip",
        vec!["install".to_string(), "-r".to_string()],
    );
    let lifecycle = LifecycleManager::new(loader.clone(), host.clone(), ENTRY_EXTENSION);

    let manager = ExtensionManager::new(
        host,
        registry,
        fetcher,
        dependencies,
        lifecycle,
        store.clone(),
    );

    Harness {
        dir,
        http,
        runner,
        loader,
        store,
        manager,
    }
}

/// Harness that has finished its startup pass
pub async fn ready_harness(options: Options) -> Harness {
    let harness = harness(options).await;
    harness.manager.startup().await.unwrap();
    harness
}
