//! Fetcher - downloads repository archives and extracts one plugin's subtree

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use crate::application::errors::{ExtensionError, ExtractionError};
use crate::domain::entities::PluginRef;
use crate::domain::traits::HttpClient;
use crate::infrastructure::cache::ArtifactCache;

/// Downloads, caches and extracts plugins
pub struct Fetcher {
    plugins_root: PathBuf,
    archive_host: String,
    http: Arc<dyn HttpClient>,
    cache: ArtifactCache,
}

impl Fetcher {
    pub fn new(
        plugins_root: impl Into<PathBuf>,
        archive_host: impl Into<String>,
        http: Arc<dyn HttpClient>,
        cache: ArtifactCache,
    ) -> Self {
        Self {
            plugins_root: plugins_root.into(),
            archive_host: archive_host.into(),
            http,
            cache,
        }
    }

    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    pub fn archive_host(&self) -> &str {
        &self.archive_host
    }

    /// Where the plugin's files live once extracted
    pub fn install_dir(&self, plugin: &PluginRef) -> PathBuf {
        self.plugins_root.join(plugin.relative_path())
    }

    /// Make sure the plugin's files are on disk and return their directory.
    ///
    /// Without `force` an existing install directory is returned untouched and a
    /// cached archive is reused. With `force` the archive is always downloaded again.
    pub async fn fetch(&self, plugin: &PluginRef, force: bool) -> Result<PathBuf, ExtensionError> {
        let install_dir = self.install_dir(plugin);
        if !force && tokio::fs::try_exists(&install_dir).await.unwrap_or(false) {
            return Ok(install_dir);
        }

        tokio::fs::create_dir_all(&install_dir)
            .await
            .map_err(ExtractionError::Io)?;

        let bytes = self.archive_bytes(plugin, force).await?;

        let name = plugin.name.clone();
        let dest = install_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_plugin(&bytes, &name, &dest))
            .await
            .map_err(|e| ExtractionError::Io(io::Error::other(e)))??;

        tracing::debug!("Extracted {} entries for {}", extracted, plugin);
        Ok(install_dir)
    }

    async fn archive_bytes(&self, plugin: &PluginRef, force: bool) -> Result<Vec<u8>, ExtensionError> {
        if !force {
            if let Some(bytes) = self.cache.read(plugin).await? {
                tracing::debug!(
                    "Loading {} from cache {}",
                    plugin,
                    self.cache.path_for(plugin).display()
                );
                return Ok(bytes);
            }
        }

        let url = plugin.archive_url(&self.archive_host);
        tracing::debug!("Downloading {}", url);
        let bytes = self.http.get(&url).await?;
        self.cache.write(plugin, &bytes).await?;
        Ok(bytes)
    }
}

/// Extract the entries under `<root>/<name>/` of a repository archive into `dest`.
///
/// The archive's top-level directory is stripped along with the plugin directory
/// itself; entries belonging to other plugins are skipped. Returns the number of
/// entries written.
pub fn extract_plugin(bytes: &[u8], name: &str, dest: &Path) -> Result<usize, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?;

    let mut found_subtree = false;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?;

        let Some(path) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };

        let parts: Vec<Component> = path.components().collect();
        if parts.len() < 2 || parts[1].as_os_str() != std::ffi::OsStr::new(name) {
            continue;
        }
        found_subtree = true;
        if parts.len() < 3 {
            continue;
        }

        let outpath = dest.join(parts[2..].iter().collect::<PathBuf>());
        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;
        }
        extracted += 1;
    }

    if !found_subtree {
        return Err(ExtractionError::MissingPluginSubtree(name.to_string()));
    }
    Ok(extracted)
}
