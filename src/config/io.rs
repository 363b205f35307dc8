use anyhow::{bail, Context, Result};
use std::path::Path;

/// Maximum size for a config or secrets file (10 MB).
pub const MAX_CONFIG_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Parse a JSON5 configuration string.
pub fn parse_config_json5(content: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = json5::from_str(content)?;
    Ok(value)
}

/// Read a configuration file into a generic value.
///
/// The format is chosen by extension: `.yaml`/`.yml`, `.toml`, anything
/// else JSON5 with a plain JSON fallback.
pub fn read_config_file(path: &Path) -> Result<serde_json::Value> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot stat config file '{}'", path.display()))?;

    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        bail!(
            "Config file '{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_BYTES,
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    let value: serde_json::Value = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in '{}'", path.display()))?,
        "toml" => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in '{}'", path.display()))?,
        _ => parse_config_json5(&content)
            .or_else(|_| serde_json::from_str(&content).map_err(anyhow::Error::from))
            .with_context(|| format!("Invalid JSON in '{}'", path.display()))?,
    };

    // A YAML file holding only comments parses to null.
    Ok(match value {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn read_json_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("avp.json");
        fs::write(&file, r#"{"backend": {"type": "sops"}}"#).unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config["backend"]["type"], "sops");
    }

    #[test]
    fn read_json5_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("avp.json");
        fs::write(&file, "{ kvVersion: '2', // trailing comment\n}").unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config["kvVersion"], "2");
    }

    #[test]
    fn read_yaml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("avp.yaml");
        fs::write(&file, "backend:\n  type: file\n  secretsFile: s.yaml\n").unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config["backend"]["secretsFile"], "s.yaml");
    }

    #[test]
    fn read_toml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("avp.toml");
        fs::write(&file, "pathValidation = '^kv/'\n[logging]\nlevel = 'debug'\n").unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config["logging"]["level"], "debug");
    }

    #[test]
    fn reject_oversized_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("huge.json");
        let content = "x".repeat((MAX_CONFIG_FILE_BYTES + 1) as usize);
        fs::write(&file, content).unwrap();

        let result = read_config_file(&file);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds limit"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_config_file(&dir.path().join("absent.yaml")).is_err());
    }
}
