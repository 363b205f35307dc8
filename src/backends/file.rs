//! File-backed secret store.
//!
//! Loads a secrets document whose top-level keys are secret paths. Each path
//! holds either a mapping (a single version) or a sequence of mappings
//! (successive versions, oldest first):
//!
//! ```yaml
//! kv/data/app:
//!   username: admin
//! kv/data/db:
//!   - password: first
//!   - password: second
//! ```

use super::memory::MemoryBackend;
use super::types::{BackendError, FetchOptions, SecretBackend, SecretMap};
use crate::config::MAX_CONFIG_FILE_BYTES;
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Resolves secrets from a document read once at startup.
#[derive(Debug)]
pub struct FileBackend {
    inner: MemoryBackend,
}

impl FileBackend {
    /// Read and parse a secrets file. The format is chosen by extension
    /// (`.yaml`/`.yml`, `.toml`, anything else JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let io_err = |source| BackendError::Io {
            path: shown.clone(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(io_err)?;
        if metadata.len() > MAX_CONFIG_FILE_BYTES {
            return Err(BackendError::Parse {
                path: shown.clone(),
                message: format!(
                    "file is {} bytes, exceeds limit of {} bytes",
                    metadata.len(),
                    MAX_CONFIG_FILE_BYTES
                ),
            });
        }

        let content = std::fs::read_to_string(path).map_err(io_err)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |message: String| BackendError::Parse {
            path: shown.clone(),
            message,
        };
        let document: Value = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
            "toml" => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
            _ => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        };

        let backend = Self::from_document(&document).map_err(parse_err)?;
        info!("Loaded secrets file '{}'", shown);
        Ok(backend)
    }

    /// Build the store from an already-parsed secrets document.
    pub fn from_document(document: &Value) -> Result<Self, String> {
        let paths = document
            .as_object()
            .ok_or_else(|| "top level must be a mapping of secret paths".to_string())?;

        let inner = MemoryBackend::new();
        for (path, entry) in paths {
            match entry {
                Value::Object(_) => {
                    inner.load_data(path, to_secret_map(path, entry)?);
                }
                Value::Array(versions) => {
                    for version in versions {
                        inner.load_data(path, to_secret_map(path, version)?);
                    }
                }
                _ => {
                    return Err(format!(
                        "'{path}' must be a mapping or a sequence of mappings"
                    ))
                }
            }
        }

        Ok(Self { inner })
    }
}

fn to_secret_map(path: &str, value: &Value) -> Result<SecretMap, String> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        _ => Err(format!("every version of '{path}' must be a mapping")),
    }
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn get_secrets(&self, path: &str, options: &FetchOptions) -> Result<SecretMap, BackendError> {
        self.inner.get_secrets(path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_yaml_with_versions() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("secrets.yaml");
        fs::write(
            &file,
            "kv/app:\n  username: admin\nkv/db:\n  - password: first\n  - password: second\n",
        )
        .unwrap();

        let backend = FileBackend::load(&file).unwrap();
        let app = backend.get_secrets("kv/app", &FetchOptions::default()).unwrap();
        assert_eq!(app["username"], "admin");

        let first = FetchOptions::default().with_version(Some("1".into()));
        assert_eq!(
            backend.get_individual_secret("kv/db", "password", &first).unwrap(),
            Some(json!("first"))
        );
        assert_eq!(
            backend
                .get_individual_secret("kv/db", "password", &FetchOptions::default())
                .unwrap(),
            Some(json!("second"))
        );
    }

    #[test]
    fn load_json_keeps_non_string_values() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("secrets.json");
        fs::write(&file, r#"{"kv/app": {"replicas": 3, "debug": true}}"#).unwrap();

        let backend = FileBackend::load(&file).unwrap();
        let app = backend.get_secrets("kv/app", &FetchOptions::default()).unwrap();
        assert_eq!(app["replicas"], json!(3));
        assert_eq!(app["debug"], json!(true));
    }

    #[test]
    fn load_toml() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("secrets.toml");
        fs::write(&file, "[\"kv/app\"]\napikey = \"123\"\n").unwrap();

        let backend = FileBackend::load(&file).unwrap();
        let app = backend.get_secrets("kv/app", &FetchOptions::default()).unwrap();
        assert_eq!(app["apikey"], "123");
    }

    #[test]
    fn reject_scalar_path_entry() {
        let err = FileBackend::from_document(&json!({"kv/app": "oops"})).unwrap_err();
        assert!(err.contains("kv/app"));
    }

    #[test]
    fn reject_non_mapping_document() {
        assert!(FileBackend::from_document(&json!(["kv/app"])).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = FileBackend::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, BackendError::Io { .. }));
    }
}
