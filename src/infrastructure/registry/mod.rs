//! Registry client - read-through copy of the published plugin catalog

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::application::errors::{DownloadError, RegistryError};
use crate::domain::entities::RegistryEntry;
use crate::domain::traits::HttpClient;

/// Catalog keyed by short name
pub type Catalog = HashMap<String, RegistryEntry>;

/// Minimum similarity for a name to be suggested
const SUGGESTION_CUTOFF: f64 = 0.6;
const MAX_SUGGESTIONS: usize = 3;

/// Fetches the registry document and holds the last good catalog
pub struct RegistryClient {
    url: String,
    http: Arc<dyn HttpClient>,
    catalog: RwLock<Arc<Catalog>>,
}

impl RegistryClient {
    pub fn new(url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            url: url.into(),
            http,
            catalog: RwLock::new(Arc::new(Catalog::new())),
        }
    }

    /// Fetch the registry and swap in the new catalog.
    ///
    /// On failure the previous catalog stays in place.
    pub async fn refresh(&self) -> Result<usize, RegistryError> {
        let body = self.http.get(&self.url).await.map_err(|e| match e {
            DownloadError::HttpStatus { status, .. } => {
                RegistryError::Unreachable(format!("status {}", status))
            }
            other => RegistryError::Unreachable(other.to_string()),
        })?;

        let catalog = parse_catalog(&body)?;
        let count = catalog.len();
        *self.catalog.write().await = Arc::new(catalog);

        tracing::debug!("Registry refreshed from {}: {} plugins", self.url, count);
        Ok(count)
    }

    /// Current catalog; a consistent snapshot even while a refresh runs
    pub async fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    pub async fn get(&self, short_name: &str) -> Option<RegistryEntry> {
        self.catalog.read().await.get(short_name).cloned()
    }

    /// Registry names that look like `name`, best match first
    pub async fn suggestions(&self, name: &str) -> Vec<String> {
        let catalog = self.catalog().await;
        close_matches(name, catalog.keys().map(String::as_str))
    }
}

/// Parse the registry document: a JSON object of short name to entry
pub fn parse_catalog(body: &[u8]) -> Result<Catalog, RegistryError> {
    let raw: HashMap<String, RegistryEntry> = serde_json::from_slice(body)
        .map_err(|e| RegistryError::MalformedResponse(e.to_string()))?;

    Ok(raw
        .into_iter()
        .map(|(name, mut entry)| {
            entry.short_name = name.clone();
            (name, entry)
        })
        .collect())
}

/// Best matches first; equal scores favour the larger name, as difflib's `get_close_matches` does
fn close_matches<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = candidates
        .map(|candidate| (similarity(candidate, name), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(a.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

/// Ratcliff/Obershelp ratio: 2 * matched characters / total length, in [0, 1].
///
/// Matched characters come from the longest common block plus, recursively,
/// the blocks to its left and right, as difflib's `SequenceMatcher.ratio` counts them.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, size) = longest_block(a, b);
    if size == 0 {
        return 0;
    }
    size + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + size..], &b[j + size..])
}

/// Longest common block as `(start in a, start in b, len)`; earliest in `a`, then in `b`
fn longest_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best.2 {
                    best = (i + 1 - row[j + 1], j + 1 - row[j + 1], row[j + 1]);
                }
            }
        }
        prev = row;
    }
    best
}
