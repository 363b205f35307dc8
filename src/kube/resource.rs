//! One manifest under substitution.

use super::error::{ReplaceErrors, TemplateError};
use super::placeholder::contains_placeholder;
use super::policy::{collect_annotations, Annotations, Mode, PathValidator, Policy};
use super::render::{self, OutputFormat};
use super::resolver::Resolver;
use super::walker::{decode_placeholders, Walker};
use crate::backends::SecretBackend;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A parsed manifest together with everything needed to fill it in.
pub struct Resource {
    kind: String,
    annotations: Annotations,
    template_data: Map<String, Value>,
    data: Map<String, Value>,
    backend: Option<Arc<dyn SecretBackend>>,
    validator: Option<Arc<dyn PathValidator>>,
    policy: Policy,
}

impl Resource {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Control annotations: `metadata.annotations` merged with the side
    /// channel.
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn template_data(&self) -> &Map<String, Value> {
        &self.template_data
    }

    /// Local values bare placeholders resolve against.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("values", &self.data.len())
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

// ============================================================================
// Template
// ============================================================================

/// Entry point for placeholder substitution on a single manifest.
///
/// ```no_run
/// # use avp::kube::Template;
/// # use serde_json::json;
/// let manifest = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {}});
/// let mut template = Template::new(manifest, None, None)?;
/// template.replace()?;
/// println!("{}", template.to_yaml()?);
/// # Ok::<(), avp::kube::TemplateError>(())
/// ```
#[derive(Debug)]
pub struct Template {
    resource: Resource,
}

impl Template {
    /// Build a template with default options.
    pub fn new(
        manifest: Value,
        backend: Option<Arc<dyn SecretBackend>>,
        validator: Option<Arc<dyn PathValidator>>,
    ) -> Result<Self, TemplateError> {
        let mut builder = Self::builder(manifest);
        builder.backend = backend;
        builder.validator = validator;
        builder.build()
    }

    pub fn builder(manifest: Value) -> TemplateBuilder {
        TemplateBuilder {
            manifest,
            backend: None,
            validator: None,
            annotations: Annotations::new(),
            values: Map::new(),
            default_kv_version: None,
            fetch: true,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.resource.template_data)
    }

    /// Substitute every placeholder in place.
    ///
    /// All failures are collected before returning; on error the tree holds
    /// whatever substitutions did succeed.
    pub fn replace(&mut self) -> Result<(), TemplateError> {
        let resource = &mut self.resource;
        if resource.policy.mode == Mode::Ignored {
            debug!("Skipping ignored {}", resource.kind);
            return Ok(());
        }

        let resolver = Resolver {
            policy: &resource.policy,
            values: &resource.data,
            backend: resource.backend.as_deref(),
            validator: resource.validator.as_deref(),
        };
        let failures = Walker::new(&resolver, &resource.kind).walk(&mut resource.template_data);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReplaceErrors::new(failures).into())
        }
    }

    pub fn to_yaml(&self) -> Result<String, TemplateError> {
        render::to_yaml(&self.resource.template_data)
    }

    pub fn to_json(&self) -> Result<String, TemplateError> {
        render::to_json(&self.resource.template_data)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, TemplateError> {
        render::render(&self.resource.template_data, format)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Options for [`Template`] construction.
pub struct TemplateBuilder {
    manifest: Value,
    backend: Option<Arc<dyn SecretBackend>>,
    validator: Option<Arc<dyn PathValidator>>,
    annotations: Annotations,
    values: Map<String, Value>,
    default_kv_version: Option<String>,
    fetch: bool,
}

impl TemplateBuilder {
    pub fn backend(mut self, backend: Arc<dyn SecretBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn path_validator(mut self, validator: Arc<dyn PathValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Side-channel control annotations. They take precedence over the
    /// manifest's own `metadata.annotations`.
    pub fn annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    /// Pre-populated local values. Fetched values never overwrite these.
    pub fn values(mut self, values: Map<String, Value>) -> Self {
        self.values = values;
        self
    }

    pub fn default_kv_version(mut self, version: impl Into<String>) -> Self {
        self.default_kv_version = Some(version.into());
        self
    }

    /// Enable or disable the eager bulk fetch (on by default).
    pub fn fetch(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn build(self) -> Result<Template, TemplateError> {
        let Value::Object(template_data) = self.manifest else {
            return Err(TemplateError::invalid_manifest("manifest must be a mapping"));
        };
        for field in ["apiVersion", "kind", "metadata"] {
            if !template_data.contains_key(field) {
                return Err(TemplateError::invalid_manifest(format!(
                    "missing required field '{field}'"
                )));
            }
        }
        let kind = match template_data.get("kind") {
            Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
            _ => return Err(TemplateError::invalid_manifest("'kind' must be a non-empty string")),
        };

        let annotations = collect_annotations(&template_data, &self.annotations);
        let policy = Policy::read(&kind, &annotations, self.default_kv_version.as_deref())?;

        let mut resource = Resource {
            kind,
            annotations,
            template_data,
            data: self.values,
            backend: self.backend,
            validator: self.validator,
            policy,
        };

        if resource.policy.mode == Mode::Ignored {
            debug!("{} is marked ignored, passing through", resource.kind);
            return Ok(Template { resource });
        }

        if let Some(path) = resource.policy.default_path() {
            if let Some(validator) = &resource.validator {
                if !validator.allows(path) {
                    return Err(TemplateError::PathDisallowed {
                        path: path.to_string(),
                    });
                }
            }
            if self.fetch && has_placeholders(&resource.template_data, &resource.kind) {
                prefetch(&mut resource)?;
            }
        }

        Ok(Template { resource })
    }
}

/// Bulk-fetch every key at the resource's default path into its local values.
fn prefetch(resource: &mut Resource) -> Result<(), TemplateError> {
    let Some(path) = resource.policy.default_path() else {
        return Ok(());
    };
    let Some(backend) = &resource.backend else {
        debug!("No secret backend, skipping fetch of '{}'", path);
        return Ok(());
    };

    let secrets = backend
        .get_secrets(path, &resource.policy.fetch_options())
        .map_err(|source| TemplateError::Backend {
            path: path.to_string(),
            source,
        })?;

    info!(
        "Fetched {} key(s) from {} path '{}' for {}",
        secrets.len(),
        backend.name(),
        path,
        resource.kind
    );

    for (key, value) in secrets {
        resource.data.entry(key).or_insert(value);
    }
    Ok(())
}

fn has_placeholders(template_data: &Map<String, Value>, kind: &str) -> bool {
    let encoded = |key: &str| kind == "Secret" && key == "data";
    template_data.iter().any(|(key, value)| match value {
        Value::Object(fields) if encoded(key) => fields.values().any(|v| match v {
            Value::String(s) => contains_placeholder(s) || decode_placeholders(s, true).is_some(),
            other => value_has_placeholders(other),
        }),
        other => value_has_placeholders(other),
    })
}

fn value_has_placeholders(value: &Value) -> bool {
    match value {
        Value::String(s) => contains_placeholder(s),
        Value::Array(items) => items.iter().any(value_has_placeholders),
        Value::Object(map) => map.values().any(value_has_placeholders),
        Value::Number(_) | Value::Bool(_) | Value::Null => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, FetchOptions, MemoryBackend, SecretMap};
    use crate::kube::policy::{IGNORE_ANNOTATION, PATH_ANNOTATION, SECRET_VERSION_ANNOTATION};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that counts bulk fetches.
    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        bulk_calls: AtomicUsize,
    }

    impl SecretBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn get_secrets(&self, path: &str, options: &FetchOptions) -> Result<SecretMap, BackendError> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_secrets(path, options)
        }

        fn get_individual_secret(
            &self,
            path: &str,
            key: &str,
            options: &FetchOptions,
        ) -> Result<Option<Value>, BackendError> {
            Ok(self.inner.get_secrets(path, options)?.remove(key))
        }
    }

    fn counting(versions: &[Value]) -> Arc<CountingBackend> {
        let backend = CountingBackend::default();
        for version in versions {
            let data: SecretMap = version
                .as_object()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            backend.inner.load_data("path/to/secret", data);
        }
        Arc::new(backend)
    }

    fn service(annotations: Value, port: &str) -> Value {
        json!({
            "kind": "Service",
            "apiVersion": "v1",
            "metadata": {"namespace": "default", "name": "my-app", "annotations": annotations},
            "spec": {"selector": {"app": "my-app"}, "ports": [{"port": port}]}
        })
    }

    #[test]
    fn fetches_when_path_set_and_placeholders_present() {
        let backend = counting(&[json!({"port": "3000"})]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "<port>");
        let mut template = Template::new(manifest, Some(backend.clone()), None).unwrap();

        assert_eq!(template.resource().kind(), "Service");
        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 1);

        template.replace().unwrap();
        assert_eq!(template.resource().template_data()["spec"]["ports"][0]["port"], "3000");
    }

    #[test]
    fn no_fetch_without_placeholders() {
        let backend = counting(&[json!({"port": "3000"})]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "3000");
        Template::new(manifest, Some(backend.clone()), None).unwrap();
        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ignored_resource_is_never_fetched_or_touched() {
        let backend = counting(&[json!({"port": "3000"})]);
        let manifest = service(
            json!({IGNORE_ANNOTATION: "True", PATH_ANNOTATION: "path/to/secret"}),
            "<port>",
        );
        let mut template = Template::new(manifest.clone(), Some(backend.clone()), None).unwrap();
        template.replace().unwrap();

        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(template.into_value(), manifest);
    }

    #[test]
    fn secret_version_annotation_selects_bulk_version() {
        let backend = counting(&[
            json!({"password": "original-value"}),
            json!({"password": "changed-value"}),
        ]);
        let manifest = json!({
            "kind": "Secret",
            "apiVersion": "v1",
            "metadata": {
                "name": "my-app",
                "annotations": {SECRET_VERSION_ANNOTATION: "1", PATH_ANNOTATION: "path/to/secret"}
            },
            "data": {
                "new-value": "<path:/path/to/secret#password#2>",
                "old-value": "<password>"
            }
        });

        let mut template = Template::new(manifest, Some(backend), None).unwrap();
        template.replace().unwrap();
        assert_eq!(
            template.resource().template_data()["data"],
            json!({"new-value": "changed-value", "old-value": "original-value"})
        );
    }

    #[test]
    fn disallowed_path_fails_before_fetch() {
        let backend = counting(&[json!({"password": "x"})]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "<port>");
        let validator = Arc::new(regex::Regex::new("/[A-Z]/").unwrap());

        let err = Template::new(manifest, Some(backend.clone()), Some(validator)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the path path/to/secret is disallowed by AVP_PATH_VALIDATION restriction"
        );
        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bulk_fetch_failure_fails_construction() {
        let backend = counting(&[]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "<port>");
        let err = Template::new(manifest, Some(backend), None).unwrap_err();
        assert!(matches!(err, TemplateError::Backend { .. }));
    }

    #[test]
    fn builder_values_win_over_fetched() {
        let backend = counting(&[json!({"port": "3000", "name": "fetched"})]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "<port>");
        let values = json!({"port": 8080}).as_object().cloned().unwrap();

        let template = Template::builder(manifest)
            .backend(backend)
            .values(values)
            .build()
            .unwrap();
        assert_eq!(template.resource().data()["port"], json!(8080));
        assert_eq!(template.resource().data()["name"], "fetched");
    }

    #[test]
    fn fetch_can_be_disabled() {
        let backend = counting(&[json!({"port": "3000"})]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "<port>");
        let template = Template::builder(manifest)
            .backend(backend.clone())
            .fetch(false)
            .build()
            .unwrap();
        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 0);
        assert!(template.resource().data().is_empty());
    }

    #[test]
    fn side_channel_annotations_override_metadata() {
        let backend = counting(&[json!({"port": "3000"})]);
        let manifest = service(json!({PATH_ANNOTATION: "path/to/secret"}), "<port>");
        let side: Annotations = [(PATH_ANNOTATION.to_string(), String::new())].into();

        let mut template = Template::builder(manifest)
            .backend(backend.clone())
            .annotations(side)
            .build()
            .unwrap();
        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 0);
        assert!(template.replace().is_err());
    }

    #[test]
    fn invalid_manifests_are_rejected() {
        for manifest in [
            json!("just text"),
            json!({"kind": "Secret", "metadata": {}}),
            json!({"apiVersion": "v1", "kind": 3, "metadata": {}}),
        ] {
            assert!(matches!(
                Template::new(manifest, None, None),
                Err(TemplateError::InvalidManifest(_))
            ));
        }
    }

    #[test]
    fn encoded_placeholders_trigger_fetch() {
        use base64::Engine as _;
        let backend = counting(&[json!({"user": "admin"})]);
        let encoded = base64::engine::general_purpose::STANDARD.encode("<user>");
        let manifest = json!({
            "kind": "Secret",
            "apiVersion": "v1",
            "metadata": {"annotations": {PATH_ANNOTATION: "path/to/secret"}},
            "data": {"user": encoded}
        });
        Template::new(manifest, Some(backend.clone()), None).unwrap();
        assert_eq!(backend.bulk_calls.load(Ordering::SeqCst), 1);
    }
}
