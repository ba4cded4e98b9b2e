//! Finished recordings and their revocable access URLs.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Revocable reference to an [`Artifact`], e.g. `blob:wavereel/4242-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactUrl(String);

impl ArtifactUrl {
    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An exported video file held in memory.
#[derive(Debug)]
pub struct Artifact {
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
    created_at: DateTime<Local>,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
            created_at: Local::now(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Suggested download name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }
}

/// Issues and revokes artifact URLs.
pub struct ArtifactStore {
    prefix: String,
    next_id: u64,
    live: HashMap<ArtifactUrl, Arc<Artifact>>,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self {
            prefix: format!("blob:wavereel/{}", std::process::id()),
            next_id: 1,
            live: HashMap::new(),
        }
    }

    pub fn create(&mut self, artifact: Artifact) -> ArtifactUrl {
        let url = ArtifactUrl(format!("{}-{}", self.prefix, self.next_id));
        self.next_id += 1;
        tracing::debug!("Issued {} ({} bytes)", url, artifact.len());
        self.live.insert(url.clone(), Arc::new(artifact));
        url
    }

    /// Invalidates `url`. Returns `false` if it was not live.
    pub fn revoke(&mut self, url: &ArtifactUrl) -> bool {
        let revoked = self.live.remove(url).is_some();
        if revoked {
            tracing::debug!("Revoked {}", url);
        }
        revoked
    }

    pub fn resolve(&self, url: &ArtifactUrl) -> Option<Arc<Artifact>> {
        self.live.get(url).cloned()
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Writes the artifact behind `url` to disk.
    ///
    /// A directory destination gets the artifact's suggested file name.
    ///
    /// # Errors
    /// - If `url` has been revoked
    /// - If the file cannot be written
    pub fn save(&self, url: &ArtifactUrl, destination: &Path) -> Result<PathBuf> {
        let artifact = self
            .resolve(url)
            .ok_or_else(|| anyhow!("{url} is no longer available"))?;
        let path = if destination.is_dir() {
            destination.join(artifact.file_name())
        } else {
            destination.to_path_buf()
        };
        std::fs::write(&path, artifact.bytes())
            .map_err(|e| anyhow!("Failed to write {}: {e}", path.display()))?;
        tracing::info!("Saved {} bytes to {}", artifact.len(), path.display());
        Ok(path)
    }
}
