use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::common::tmp_path;

/// Persistent NDC -> RxCUI map. `None` values record a confirmed "no mapping"
/// and are never looked up again.
pub struct NdcCache {
    path: PathBuf,
    entries: BTreeMap<String, Option<String>>,
    writes: usize,
}

impl NdcCache {
    /// Loads the cache file at `path`. A missing or unreadable file yields an
    /// empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, Option<String>>>(&text) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "NDC cache is corrupt; starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed reading NDC cache; starting empty"
                );
                BTreeMap::new()
            }
        };
        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded NDC cache"
        );
        Self {
            path,
            entries,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `None` on a miss, `Some(None)` for a cached "no mapping".
    pub fn get(&self, ndc: &str) -> Option<Option<&str>> {
        self.entries
            .get(ndc)
            .map(|v| v.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn put(&mut self, ndc: impl Into<String>, rxcui: Option<String>) {
        self.entries.insert(ndc.into(), rxcui);
    }

    /// Rewrites the whole cache file.
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec(&self.entries).map_err(io::Error::other)?;
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        self.writes += 1;
        Ok(())
    }

    /// Successful flushes since this cache was opened.
    pub fn writes(&self) -> usize {
        self.writes
    }
}
