//! In-memory versioned secret store.
//!
//! Every `load_data` call stores a new version of a path, numbered from 1.
//! Fetching without a version returns the latest one.

use super::types::{BackendError, FetchOptions, SecretBackend, SecretMap};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Resolves secrets from versions held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    paths: RwLock<HashMap<String, Vec<SecretMap>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` as the next version of `path`. Returns the new version
    /// number.
    pub fn load_data(&self, path: &str, data: SecretMap) -> usize {
        let mut paths = match self.paths.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let versions = paths.entry(normalize_path(path)).or_default();
        versions.push(data);
        versions.len()
    }

    /// Number of versions stored for `path`.
    pub fn version_count(&self, path: &str) -> usize {
        self.read_paths()
            .get(&normalize_path(path))
            .map_or(0, Vec::len)
    }

    fn read_paths(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<SecretMap>>> {
        match self.paths.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SecretBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_secrets(&self, path: &str, options: &FetchOptions) -> Result<SecretMap, BackendError> {
        let paths = self.read_paths();
        let not_found = || BackendError::NotFound {
            path: path.to_string(),
            version: options.version.clone(),
        };

        let versions = paths.get(&normalize_path(path)).ok_or_else(not_found)?;
        let data = match options.version.as_deref() {
            None | Some("") | Some("latest") => versions.last(),
            Some(v) => v
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| versions.get(idx)),
        }
        .ok_or_else(not_found)?;

        debug!(
            "Fetched {} key(s) from memory path '{}' (version {:?})",
            data.len(),
            path,
            options.version
        );
        Ok(data.clone())
    }
}

/// `/kv/app/` and `kv/app` name the same secret.
fn normalize_path(path: &str) -> String {
    path.trim().trim_matches('/').to_string()
}
