//! Core types shared by every secret backend.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Every key found at a secret path, with its value.
pub type SecretMap = HashMap<String, Value>;

// ============================================================================
// Fetch options
// ============================================================================

/// Parameters passed through to a backend on every fetch.
///
/// Both fields are opaque to the engine: they come verbatim from the
/// `kv-version` / `secret-version` annotations (or a placeholder's `#version`
/// suffix). `None` means the backend's default, usually the latest version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub version: Option<String>,
    pub kv_version: Option<String>,
}

impl FetchOptions {
    pub fn with_version(mut self, version: Option<String>) -> Self {
        if version.is_some() {
            self.version = version;
        }
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures surfaced by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The path (or the requested version of it) does not exist.
    #[error("secret path '{path}' not found{}", version_suffix(.version))]
    NotFound {
        path: String,
        version: Option<String>,
    },

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse '{path}': {message}")]
    Parse { path: String, message: String },

    /// An external command (e.g. `sops`) failed or timed out.
    #[error("{0}")]
    Command(String),

    #[error("{backend} backend does not support {what}")]
    Unsupported {
        backend: &'static str,
        what: String,
    },
}

fn version_suffix(version: &Option<String>) -> String {
    match version {
        Some(v) => format!(" at version {v}"),
        None => String::new(),
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// A secret store client.
///
/// Calls are blocking. Implementations must be shareable across the worker
/// threads that render independent manifests.
pub trait SecretBackend: Send + Sync {
    /// Display name for logging.
    fn name(&self) -> &str;

    /// Fetch every key stored at `path`.
    fn get_secrets(&self, path: &str, options: &FetchOptions) -> Result<SecretMap, BackendError>;

    /// Fetch a single key at `path`. `Ok(None)` means the path exists but the
    /// key does not.
    fn get_individual_secret(
        &self,
        path: &str,
        key: &str,
        options: &FetchOptions,
    ) -> Result<Option<Value>, BackendError> {
        let mut secrets = self.get_secrets(path, options)?;
        Ok(secrets.remove(key))
    }
}

/// Redact a secret value for display (show first 2 and last 2 chars).
pub fn redact_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_version() {
        let err = BackendError::NotFound {
            path: "kv/app".into(),
            version: Some("3".into()),
        };
        assert_eq!(err.to_string(), "secret path 'kv/app' not found at version 3");

        let err = BackendError::NotFound {
            path: "kv/app".into(),
            version: None,
        };
        assert_eq!(err.to_string(), "secret path 'kv/app' not found");
    }

    #[test]
    fn with_version_keeps_default_when_none() {
        let options = FetchOptions {
            version: Some("1".into()),
            kv_version: Some("2".into()),
        };
        assert_eq!(options.clone().with_version(None), options);
        assert_eq!(
            options.with_version(Some("4".into())).version.as_deref(),
            Some("4")
        );
    }

    #[test]
    fn redact_short_value() {
        assert_eq!(redact_secret("abc"), "***");
    }

    #[test]
    fn redact_long_value() {
        let redacted = redact_secret("sk-ant-api03-1234567890");
        assert!(redacted.starts_with("sk"));
        assert!(redacted.ends_with("90"));
        assert!(redacted.contains('…'));
    }

    #[test]
    fn redact_multibyte_value() {
        assert_eq!(redact_secret("ñandú-contraseña"), "ña…ña");
    }
}
