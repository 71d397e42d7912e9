//! Dependency installer - runs the external package installer for a plugin's manifest

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::errors::DependencyInstallError;
use crate::domain::traits::{CodeLoader, CommandRunner};

/// Installs the dependencies a plugin declares in its manifest file
pub struct DependencyInstaller {
    runner: Arc<dyn CommandRunner>,
    loader: Arc<dyn CodeLoader>,
    manifest: String,
    program: String,
    args: Vec<String>,
    package_dir: Option<PathBuf>,
}

impl DependencyInstaller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        loader: Arc<dyn CodeLoader>,
        manifest: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            runner,
            loader,
            manifest: manifest.into(),
            program: program.into(),
            args,
            package_dir: None,
        }
    }

    pub fn with_package_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.package_dir = dir;
        self
    }

    /// Install the manifest in `install_dir`, if there is one.
    ///
    /// Returns whether the installer ran.
    pub async fn install(&self, install_dir: &Path) -> Result<bool, DependencyInstallError> {
        let manifest = install_dir.join(&self.manifest);
        if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
            return Ok(false);
        }

        tracing::debug!("Installing requirements for {}", install_dir.display());

        // The installer runs inside the install directory
        let mut args = self.args.clone();
        args.push(self.manifest.clone());
        let output = self.runner.run(&self.program, &args, install_dir).await?;

        if !output.stdout.trim().is_empty() {
            tracing::debug!("[stdout]\n{}", output.stdout.trim());
        }
        if !output.stderr.trim().is_empty() {
            tracing::debug!("[stderr]\n{}", output.stderr.trim());
        }

        if !output.success() {
            tracing::error!(
                "Failed to install requirements for {}",
                install_dir.display()
            );
            let stderr = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Err(DependencyInstallError::NonZeroExit {
                code: output.code,
                stderr,
            });
        }

        if !output.stderr.trim().is_empty() {
            tracing::warn!(
                "Installer succeeded with warnings for {}",
                install_dir.display()
            );
        }

        self.expose_package_dir();
        Ok(true)
    }

    /// Best effort: a failure here does not fail the install
    fn expose_package_dir(&self) {
        let Some(dir) = &self.package_dir else {
            return;
        };
        if !dir.is_dir() {
            return;
        }
        if let Err(e) = self.loader.add_search_path(dir) {
            tracing::warn!("Could not expose {}: {}", dir.display(), e);
        }
    }
}
