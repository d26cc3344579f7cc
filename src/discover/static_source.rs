//! Fixture-backed discovery source: reads a JSON array of candidates from a
//! file. Used by the binary for local runs and by integration tests; real
//! deployments register platform adapters behind the same trait.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::types::{ContentCandidate, DiscoverySource};

pub struct StaticSource {
    name: String,
    path: PathBuf,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Derive the source name from the file stem, e.g. `fixtures/search.json`
    /// becomes `fixture:search`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let stem = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string();
        Self::new(format!("fixture:{stem}"), path)
    }
}

#[async_trait::async_trait]
impl DiscoverySource for StaticSource {
    async fn fetch_candidates(&self, max_count: usize) -> Result<Vec<ContentCandidate>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading fixture {}", self.path.display()))?;
        let mut candidates: Vec<ContentCandidate> = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture {}", self.path.display()))?;
        candidates.truncate(max_count);
        Ok(candidates)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
