//! Secret backends.
//!
//! A backend is the capability the substitution engine consumes to fetch
//! secret values: a bulk fetch of every key at a path, and a keyed,
//! versioned single-value fetch used by explicit `<path:...>` placeholders.
//!
//! Shipped backends:
//! - **memory**: in-process versioned store, mostly for tests and embedding
//! - **file**: a YAML/JSON/TOML secrets document loaded into memory
//! - **sops**: Mozilla SOPS encrypted files decrypted on demand

pub mod file;
pub mod memory;
pub mod sops;
pub mod types;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sops::SopsBackend;
pub use types::{BackendError, FetchOptions, SecretBackend, SecretMap};

use crate::config::{BackendKind, Config};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Build the backend selected by the configuration.
pub fn build_backend(config: &Config) -> Result<Arc<dyn SecretBackend>> {
    let backend: Arc<dyn SecretBackend> = match config.backend.kind {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::File => {
            let path = config
                .backend
                .secrets_file
                .as_deref()
                .context("file backend requires backend.secretsFile (AVP_SECRETS_FILE)")?;
            Arc::new(
                FileBackend::load(path)
                    .with_context(|| format!("Failed to load secrets file '{path}'"))?,
            )
        }
        BackendKind::Sops => Arc::new(SopsBackend::new(config.backend.sops_base_dir.clone())),
    };

    info!("Using '{}' secret backend", backend.name());
    Ok(backend)
}
