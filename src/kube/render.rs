//! Serialize a manifest tree back to text.

use super::error::TemplateError;
use serde_json::{Map, Value};

/// Output encoding for rendered manifests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

pub fn render(tree: &Map<String, Value>, format: OutputFormat) -> Result<String, TemplateError> {
    match format {
        OutputFormat::Yaml => to_yaml(tree),
        OutputFormat::Json => to_json(tree),
    }
}

pub fn to_yaml(tree: &Map<String, Value>) -> Result<String, TemplateError> {
    serde_yaml::to_string(tree).map_err(|e| TemplateError::Render(e.to_string()))
}

pub fn to_json(tree: &Map<String, Value>) -> Result<String, TemplateError> {
    serde_json::to_string_pretty(tree)
        .map(|mut out| {
            out.push('\n');
            out
        })
        .map_err(|e| TemplateError::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Map<String, Value> {
        json!({
            "kind": "ConfigMap",
            "apiVersion": "v1",
            "metadata": {"name": "app"},
            "data": {"replicas": 3, "note": "multi\nline"}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn yaml_parses_back_to_same_tree() {
        let yaml = to_yaml(&tree()).unwrap();
        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, Value::Object(tree()));
        assert!(yaml.starts_with("apiVersion: v1\n"));
    }

    #[test]
    fn json_is_pretty_and_newline_terminated() {
        let json = render(&tree(), OutputFormat::Json).unwrap();
        assert!(json.ends_with("}\n"));
        assert!(json.contains("\n  \"apiVersion\": \"v1\""));
    }
}
