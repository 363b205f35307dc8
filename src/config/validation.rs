use super::{BackendKind, Config};
use crate::backends::SopsBackend;
use anyhow::Result;
use regex::Regex;
use std::path::Path;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    if let Some(pattern) = &config.path_validation {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ConfigValidationError {
                path: "pathValidation".to_string(),
                message: format!("Invalid regular expression: {e}"),
            });
        }
    }

    match config.backend.kind {
        BackendKind::File => match config.backend.secrets_file.as_deref() {
            None | Some("") => errors.push(ConfigValidationError {
                path: "backend.secretsFile".to_string(),
                message: "File backend requires a secrets file".to_string(),
            }),
            Some(file) if !Path::new(file).is_file() => errors.push(ConfigValidationError {
                path: "backend.secretsFile".to_string(),
                message: format!("Secrets file '{file}' does not exist"),
            }),
            Some(_) => {}
        },
        BackendKind::Sops => {
            if !SopsBackend::new(None).is_available() {
                warn!("SOPS backend selected but no sops binary was found");
            }
            if let Some(dir) = config.backend.sops_base_dir.as_deref() {
                if !Path::new(dir).is_dir() {
                    errors.push(ConfigValidationError {
                        path: "backend.sopsBaseDir".to_string(),
                        message: format!("Directory '{dir}' does not exist"),
                    });
                }
            }
        }
        BackendKind::Memory => {
            warn!("Memory backend starts empty; only local values will resolve");
        }
    }

    if let Some(version) = config.kv_version.as_deref() {
        if !matches!(version, "1" | "2") {
            warn!("Unusual kvVersion '{}', passing it through to the backend", version);
        }
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
