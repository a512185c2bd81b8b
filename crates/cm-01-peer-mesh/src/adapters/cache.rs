//! Disk peer cache.
//!
//! A single JSON file of recently reachable peer URLs, written atomically
//! (temp file + rename) so a crash mid-write never truncates it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Serialize, Deserialize, Default)]
struct CacheFile {
    urls: Vec<String>,
}

/// JSON-backed cache of peer URLs for bootstrap.
pub struct DiskPeerCache {
    path: PathBuf,
}

impl DiskPeerCache {
    /// Cache at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load cached URLs; a missing or corrupt file reads as empty.
    pub fn load(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str::<CacheFile>(&raw)
                .map(|f| f.urls)
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Persist URLs atomically.
    pub fn save(&self, urls: &[String]) -> std::io::Result<()> {
        let file = CacheFile {
            urls: urls.to_vec(),
        };
        let raw = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), count = urls.len(), "peer cache saved");
        Ok(())
    }
}
