//! The `generate` pipeline: read manifests, substitute placeholders, render.
//!
//! Every document of the input stream becomes its own [`Template`] processed
//! on a blocking worker, so backend calls for different manifests overlap.
//! Output order always matches input order.

use crate::backends::{build_backend, SecretBackend};
use crate::config::Config;
use crate::kube::{OutputFormat, PathValidator, Template, TemplateError};
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};

/// File extensions picked up when the input is a directory.
const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Separator between rendered documents.
const DOCUMENT_SEPARATOR: &str = "---\n";

/// One manifest document and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source: String,
    /// Zero-based position within its source.
    pub index: usize,
    pub value: Value,
}

impl Document {
    /// `<source> document <n> (<Kind>/<name>)`, for error messages.
    pub fn describe(&self) -> String {
        let kind = self.value.get("kind").and_then(Value::as_str).unwrap_or("?");
        let name = self
            .value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("?");
        format!("{} document {} ({kind}/{name})", self.source, self.index + 1)
    }
}

/// Renders manifest streams against one backend.
#[derive(Clone)]
pub struct Generator {
    backend: Option<Arc<dyn SecretBackend>>,
    validator: Option<Arc<dyn PathValidator>>,
    default_kv_version: Option<String>,
    format: OutputFormat,
}

impl Generator {
    pub fn new(
        backend: Option<Arc<dyn SecretBackend>>,
        validator: Option<Arc<dyn PathValidator>>,
    ) -> Self {
        Self {
            backend,
            validator,
            default_kv_version: None,
            format: OutputFormat::Yaml,
        }
    }

    /// Build the backend and path validator described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = build_backend(config)?;
        let validator = config
            .path_validator()?
            .map(|regex| Arc::new(regex) as Arc<dyn PathValidator>);

        let mut generator = Self::new(Some(backend), validator);
        generator.default_kv_version = config.kv_version.clone();
        Ok(generator)
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Read `path` (file, directory or `-`) and render every document in it.
    pub async fn generate(&self, path: &str) -> Result<String> {
        let documents = load_documents(path).await?;
        info!("Loaded {} manifest(s) from '{}'", documents.len(), path);
        self.render_documents(documents).await
    }

    /// Process documents in parallel and join the rendered output.
    ///
    /// Fails if any document fails; the error lists every failed document.
    pub async fn render_documents(&self, documents: Vec<Document>) -> Result<String> {
        let labels: Vec<String> = documents.iter().map(Document::describe).collect();

        let handles = documents.into_iter().map(|doc| {
            let generator = self.clone();
            tokio::task::spawn_blocking(move || generator.render_one(doc.value))
        });
        let results = join_all(handles).await;

        let mut rendered = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (label, result) in labels.iter().zip(results) {
            match result {
                Ok(Ok(text)) => rendered.push(text),
                Ok(Err(e)) => {
                    error!("Failed to render {}", label);
                    failures.push(format!("{label}: {e}"));
                }
                Err(e) => failures.push(format!("{label}: worker task failed: {e}")),
            }
        }

        if !failures.is_empty() {
            bail!("{}", failures.join("\n"));
        }
        Ok(rendered.join(DOCUMENT_SEPARATOR))
    }

    /// Construct, replace and render a single manifest.
    pub fn render_one(&self, manifest: Value) -> Result<String, TemplateError> {
        let mut builder = Template::builder(manifest);
        if let Some(backend) = &self.backend {
            builder = builder.backend(Arc::clone(backend));
        }
        if let Some(validator) = &self.validator {
            builder = builder.path_validator(Arc::clone(validator));
        }
        if let Some(version) = &self.default_kv_version {
            builder = builder.default_kv_version(version.clone());
        }

        let mut template = builder.build()?;
        template.replace()?;
        debug!("Rendered {}", template.resource().kind());
        template.render(self.format)
    }
}

// ============================================================================
// Input
// ============================================================================

/// Read every manifest document from a file, a directory, or stdin (`-`).
pub async fn load_documents(path: &str) -> Result<Vec<Document>> {
    if path == "-" {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("Failed to read manifests from stdin")?;
        return split_documents("<stdin>", &content);
    }

    let target = Path::new(path);
    let metadata = tokio::fs::metadata(target)
        .await
        .with_context(|| format!("Cannot access '{path}'"))?;

    let files = if metadata.is_dir() {
        manifest_files(target).await?
    } else {
        vec![target.to_path_buf()]
    };

    let mut documents = Vec::new();
    for file in files {
        let content = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read '{}'", file.display()))?;
        documents.extend(split_documents(&file.display().to_string(), &content)?);
    }
    Ok(documents)
}

/// Manifest files directly inside `dir`, sorted by name.
async fn manifest_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list '{}'", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_manifest = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext));
        if is_manifest && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every document of a YAML (or JSON) stream, skipping empty ones.
pub fn split_documents(source: &str, content: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for (position, doc) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = Value::deserialize(doc)
            .with_context(|| format!("Invalid YAML in {source} document {}", position + 1))?;
        if value.is_null() {
            continue;
        }
        documents.push(Document {
            source: source.to_string(),
            index: documents.len(),
            value,
        });
    }
    Ok(documents)
}
