mod defaults;
mod io;
mod types;
mod validation;

pub use defaults::*;
pub use io::*;
pub use types::*;
pub use validation::*;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level avp configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Regular expression every secret path must match.
    pub path_validation: Option<String>,
    /// KV engine version used when a manifest has no kv-version annotation.
    pub kv_version: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File the configuration was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
    /// Problems found while loading, logged once logging is installed.
    #[serde(skip)]
    pub load_warnings: Vec<String>,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                let p = PathBuf::from(p);
                if !p.exists() {
                    bail!("Config file '{}' does not exist", p.display());
                }
                Some(p)
            }
            None => find_config_file(),
        };

        let mut config = match config_path {
            Some(path) => {
                let mut config = load_config_file(&path)?;
                config.source = Some(path);
                config
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Compile `path_validation`, if set.
    pub fn path_validator(&self) -> Result<Option<Regex>> {
        self.path_validation
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| Regex::new(p).with_context(|| format!("Invalid pathValidation regex '{p}'")))
            .transpose()
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(kind) = var("AVP_TYPE") {
            match kind.parse::<BackendKind>() {
                Ok(kind) => self.backend.kind = kind,
                Err(e) => self.load_warnings.push(format!("Ignoring AVP_TYPE: {e}")),
            }
        }

        if let Some(file) = var("AVP_SECRETS_FILE") {
            self.backend.secrets_file = Some(file);
        }

        if let Some(dir) = var("AVP_SOPS_BASE_DIR") {
            self.backend.sops_base_dir = Some(dir);
        }

        if let Some(pattern) = var("AVP_PATH_VALIDATION") {
            self.path_validation = Some(pattern);
        }

        if let Some(version) = var("AVP_KV_VERSION") {
            self.kv_version = Some(version);
        }

        if let Some(level) = var("AVP_LOG_LEVEL") {
            match level.parse::<LoggingLevel>() {
                Ok(level) => self.logging.level = level,
                Err(e) => self.load_warnings.push(format!("Ignoring AVP_LOG_LEVEL: {e}")),
            }
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILE_CANDIDATES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(HOME_CONFIG_DIR).join(HOME_CONFIG_FILE);
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<Config> {
    let value = read_config_file(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("Invalid configuration in '{}'", path.display()))
}
