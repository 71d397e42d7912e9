//! Plugin reference - the four-part identifier of one plugin

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::errors::ResolutionError;

/// Branch used when none is given
pub const DEFAULT_BRANCH: &str = "master";

/// Code hosting service that serves repository archives
pub const DEFAULT_ARCHIVE_HOST: &str = "github.com";

static STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)/(.+?)/(.+?)@(.+?)$").expect("strict plugin pattern is valid")
});

static LENIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)/(.+?)/(.+?)(?:@(.+?))?$").expect("lenient plugin pattern is valid")
});

/// Identifies exactly one plugin living in a subdirectory of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginRef {
    pub owner: String,
    pub repository: String,
    pub name: String,
    pub branch: String,
}

impl PluginRef {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        name: impl Into<String>,
        branch: Option<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            name: name.into(),
            branch: branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        }
    }

    /// Build a ref from registry coordinates (`owner/repo`)
    pub fn from_repository(
        repository: &str,
        name: impl Into<String>,
        branch: Option<String>,
    ) -> Result<Self, ResolutionError> {
        let (owner, repo) = repository
            .split_once('/')
            .ok_or_else(|| ResolutionError::InvalidFormat(repository.to_string()))?;
        Self::checked(repository, owner, repo, &name.into(), branch)
    }

    /// Parse `owner/repo/name@branch`, every part required
    pub fn parse_strict(input: &str) -> Result<Self, ResolutionError> {
        let caps = STRICT
            .captures(input.trim())
            .ok_or_else(|| ResolutionError::InvalidFormat(input.to_string()))?;
        Self::checked(input, &caps[1], &caps[2], &caps[3], Some(caps[4].to_string()))
    }

    /// Parse `owner/repo/name[@branch]`, branch defaults to master
    pub fn parse_lenient(input: &str) -> Result<Self, ResolutionError> {
        let caps = LENIENT
            .captures(input.trim())
            .ok_or_else(|| ResolutionError::InvalidFormat(input.to_string()))?;
        Self::checked(
            input,
            &caps[1],
            &caps[2],
            &caps[3],
            caps.get(4).map(|m| m.as_str().to_string()),
        )
    }

    /// Every part becomes one path component under the plugins root
    fn checked(
        input: &str,
        owner: &str,
        repository: &str,
        name: &str,
        branch: Option<String>,
    ) -> Result<Self, ResolutionError> {
        let parts = [Some(owner), Some(repository), Some(name), branch.as_deref()];
        if !parts.into_iter().flatten().all(is_path_segment) {
            return Err(ResolutionError::InvalidFormat(input.to_string()));
        }
        Ok(Self::new(owner, repository, name, branch))
    }

    /// Canonical string form, used for persistence and equality
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Download URL of the whole-repository archive
    pub fn archive_url(&self, host: &str) -> String {
        format!(
            "https://{}/{}/{}/archive/{}.zip",
            host, self.owner, self.repository, self.branch
        )
    }

    /// Human readable link to the plugin's directory
    pub fn link(&self, host: &str) -> String {
        format!(
            "https://{}/{}/{}/tree/{}/{}",
            host, self.owner, self.repository, self.branch, self.name
        )
    }

    /// Install location relative to the plugins root
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.owner)
            .join(&self.repository)
            .join(format!("{}-{}", self.name, self.branch))
    }

    /// Cache file name; every plugin of one repository branch shares it
    pub fn cache_file_name(&self) -> String {
        format!("{}-{}-{}.zip", self.owner, self.repository, self.branch)
    }

    /// Logical identifier the lifecycle manager loads the code unit under
    pub fn extension_id(&self) -> String {
        format!(
            "plugins.{}.{}.{}-{}.{}",
            self.owner, self.repository, self.name, self.branch, self.name
        )
    }

    /// Display order: by name, case-insensitive
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.name
            .to_lowercase()
            .cmp(&other.name.to_lowercase())
            .then_with(|| self.canonical().cmp(&other.canonical()))
    }
}

impl fmt::Display for PluginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.owner, self.repository, self.name, self.branch
        )
    }
}

impl FromStr for PluginRef {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

fn is_path_segment(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
}

/// Sort refs for display
pub fn sort_for_display(refs: &mut [PluginRef]) {
    refs.sort_by(|a, b| a.display_cmp(b));
}
