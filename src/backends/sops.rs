//! SOPS-encrypted file backend.
//!
//! The secret path names an encrypted file. The file is decrypted with
//! Mozilla SOPS and its top-level keys become the secret's keys. Relative
//! paths resolve against the configured base directory.

use super::types::{BackendError, FetchOptions, SecretBackend, SecretMap};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for SOPS decryption.
const SOPS_TIMEOUT_SECS: u64 = 30;

/// Resolves secrets from SOPS-encrypted files.
#[derive(Debug, Clone)]
pub struct SopsBackend {
    /// Base directory for resolving relative SOPS file paths.
    base_dir: Option<String>,
    /// Explicit `sops` executable; looked up on `PATH` when unset.
    binary: Option<String>,
}

impl SopsBackend {
    pub fn new(base_dir: Option<String>) -> Self {
        Self {
            base_dir,
            binary: None,
        }
    }

    /// Use a specific `sops` executable instead of searching for one.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Whether a `sops` executable can be run.
    pub fn is_available(&self) -> bool {
        self.sops_bin().is_some()
    }

    fn sops_bin(&self) -> Option<String> {
        match &self.binary {
            Some(binary) => Some(binary.clone()),
            None => which_sops(),
        }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let candidate = PathBuf::from(path);
        if candidate.is_absolute() {
            return candidate;
        }
        match &self.base_dir {
            Some(base) => PathBuf::from(base).join(candidate),
            None => candidate,
        }
    }

    /// Blocking entry point. Reuses the ambient tokio runtime when called
    /// from one of its blocking workers, otherwise spins up a local one.
    fn decrypt(&self, file: &Path) -> Result<String, BackendError> {
        let sops_bin = self
            .sops_bin()
            .ok_or_else(|| BackendError::Command("SOPS binary not found on PATH".to_string()))?;
        let run = decrypt_file(sops_bin, file);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(run),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| BackendError::Command(format!("Failed to start runtime: {e}")))?
                .block_on(run),
        }
    }
}

async fn decrypt_file(sops_bin: String, file: &Path) -> Result<String, BackendError> {
    let mut cmd = Command::new(&sops_bin);
    cmd.arg("-d").arg(file);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let result = tokio::time::timeout(Duration::from_secs(SOPS_TIMEOUT_SECS), cmd.output()).await;

    match result {
        Ok(Ok(output)) => {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    "SOPS decrypt of '{}' failed with status {}",
                    file.display(),
                    output.status
                );
                return Err(BackendError::Command(format!(
                    "SOPS decrypt failed: {}",
                    stderr.trim()
                )));
            }
            String::from_utf8(output.stdout)
                .map_err(|e| BackendError::Command(format!("SOPS output is not UTF-8: {e}")))
        }
        Ok(Err(e)) => Err(BackendError::Command(format!("Failed to run SOPS: {e}"))),
        Err(_) => Err(BackendError::Command(format!(
            "SOPS decrypt timed out after {SOPS_TIMEOUT_SECS}s"
        ))),
    }
}

/// Find the `sops` binary on PATH.
fn which_sops() -> Option<String> {
    for name in ["sops", "/usr/local/bin/sops", "/usr/bin/sops"] {
        if std::process::Command::new(name)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
        {
            return Some(name.to_string());
        }
    }
    None
}

impl SecretBackend for SopsBackend {
    fn name(&self) -> &str {
        "sops"
    }

    fn get_secrets(&self, path: &str, options: &FetchOptions) -> Result<SecretMap, BackendError> {
        if let Some(version) = options.version.as_deref().filter(|v| !v.is_empty()) {
            return Err(BackendError::Unsupported {
                backend: "sops",
                what: format!("secret versions (requested version {version} of '{path}')"),
            });
        }

        let file = self.resolve_path(path);
        if !file.exists() {
            return Err(BackendError::NotFound {
                path: file.display().to_string(),
                version: None,
            });
        }

        debug!("Decrypting SOPS file '{}'", file.display());
        let content = self.decrypt(&file)?;
        parse_decrypted(&content, path)
    }
}

/// Parse decrypted SOPS output (JSON or YAML) into its top-level keys.
fn parse_decrypted(content: &str, path: &str) -> Result<SecretMap, BackendError> {
    let value: Value = if let Ok(v) = serde_json::from_str(content) {
        v
    } else if let Ok(v) = serde_yaml::from_str(content) {
        v
    } else {
        return Err(BackendError::Parse {
            path: path.to_string(),
            message: "decrypted SOPS file is neither JSON nor YAML".to_string(),
        });
    };

    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(BackendError::Parse {
            path: path.to_string(),
            message: "decrypted SOPS file must be a mapping".to_string(),
        }),
    }
}
