//! Control annotations and the per-resource policy derived from them.

use super::error::TemplateError;
use crate::backends::FetchOptions;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Presence switches the resource into strict mode; the value is the
/// default secret path for bare placeholders.
pub const PATH_ANNOTATION: &str = "avp.kubernetes.io/path";
/// Truthy value passes the resource through untouched.
pub const IGNORE_ANNOTATION: &str = "avp.kubernetes.io/ignore";
/// Truthy value deletes data keys whose placeholder has no value.
pub const REMOVE_MISSING_ANNOTATION: &str = "avp.kubernetes.io/remove-missing";
pub const KV_VERSION_ANNOTATION: &str = "avp.kubernetes.io/kv-version";
pub const SECRET_VERSION_ANNOTATION: &str = "avp.kubernetes.io/secret-version";

/// Control annotation name to value.
pub type Annotations = BTreeMap<String, String>;

/// How unresolved bare placeholders are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every bare placeholder must resolve.
    Strict,
    /// Unresolved bare placeholders are left as literal text.
    Lenient,
    /// The resource is passed through without any fetch or substitution.
    Ignored,
}

/// Policy descriptor computed once per resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub path: Option<String>,
    pub ignore: bool,
    pub remove_missing: bool,
    pub kv_version: Option<String>,
    pub secret_version: Option<String>,
    pub mode: Mode,
}

impl Policy {
    /// Derive the policy for a resource of `kind`.
    ///
    /// `default_kv_version` applies when the kv-version annotation is absent.
    pub fn read(
        kind: &str,
        annotations: &Annotations,
        default_kv_version: Option<&str>,
    ) -> Result<Self, TemplateError> {
        let flag = |name: &str| annotations.get(name).is_some_and(|v| is_truthy(v));

        let path = annotations.get(PATH_ANNOTATION).cloned();
        let ignore = flag(IGNORE_ANNOTATION);
        let remove_missing = flag(REMOVE_MISSING_ANNOTATION);

        let mode = if ignore {
            Mode::Ignored
        } else if path.is_some() {
            Mode::Strict
        } else {
            Mode::Lenient
        };

        if mode != Mode::Ignored && remove_missing && !is_data_kind(kind) {
            return Err(TemplateError::RemoveMissingNotAllowed);
        }

        Ok(Self {
            path,
            ignore,
            remove_missing,
            kv_version: annotations
                .get(KV_VERSION_ANNOTATION)
                .cloned()
                .or_else(|| default_kv_version.map(String::from)),
            secret_version: annotations.get(SECRET_VERSION_ANNOTATION).cloned(),
            mode,
        })
    }

    /// The secret path bare placeholders are fetched from, when non-empty.
    pub fn default_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.trim().is_empty())
    }

    pub fn is_strict(&self) -> bool {
        self.mode == Mode::Strict
    }

    /// Options for backend fetches made on behalf of this resource.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            version: self.secret_version.clone(),
            kv_version: self.kv_version.clone(),
        }
    }
}

/// Kinds whose `data` / `stringData` fields get content-safety checks and
/// support remove-missing.
pub fn is_data_kind(kind: &str) -> bool {
    matches!(kind, "Secret" | "ConfigMap")
}

/// Boolean annotation values: `1`, `t`, `T`, `true`, `TRUE`, `True`.
pub fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

/// Merge the manifest's `metadata.annotations` with a side-channel set.
/// Side-channel entries win. Non-string annotation values are stringified.
pub fn collect_annotations(manifest: &Map<String, Value>, side: &Annotations) -> Annotations {
    let mut annotations: Annotations = manifest
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    annotations.extend(side.iter().map(|(k, v)| (k.clone(), v.clone())));
    annotations
}

// ============================================================================
// Path validation
// ============================================================================

/// Allow/deny predicate applied to secret paths before any fetch.
pub trait PathValidator: Send + Sync {
    fn allows(&self, path: &str) -> bool;
}

impl PathValidator for Regex {
    fn allows(&self, path: &str) -> bool {
        self.is_match(path)
    }
}

impl<F> PathValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn allows(&self, path: &str) -> bool {
        self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn annotations(pairs: &[(&str, &str)]) -> Annotations {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn path_presence_means_strict_even_when_empty() {
        let policy = Policy::read("Deployment", &annotations(&[(PATH_ANNOTATION, "")]), None).unwrap();
        assert_eq!(policy.mode, Mode::Strict);
        assert_eq!(policy.default_path(), None);

        let policy = Policy::read(
            "Deployment",
            &annotations(&[(PATH_ANNOTATION, "kv/data/app")]),
            None,
        )
        .unwrap();
        assert!(policy.is_strict());
        assert_eq!(policy.default_path(), Some("kv/data/app"));
    }

    #[test]
    fn no_path_means_lenient() {
        let policy = Policy::read("Deployment", &Annotations::new(), None).unwrap();
        assert_eq!(policy.mode, Mode::Lenient);
    }

    #[test]
    fn ignore_wins_over_everything() {
        let policy = Policy::read(
            "Service",
            &annotations(&[
                (IGNORE_ANNOTATION, "True"),
                (PATH_ANNOTATION, "kv/app"),
                (REMOVE_MISSING_ANNOTATION, "true"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(policy.mode, Mode::Ignored);
    }

    #[test]
    fn ignore_requires_truthy_value() {
        let policy =
            Policy::read("Service", &annotations(&[(IGNORE_ANNOTATION, "nope")]), None).unwrap();
        assert_eq!(policy.mode, Mode::Lenient);
    }

    #[test]
    fn remove_missing_only_on_secret_or_configmap() {
        let set = annotations(&[(REMOVE_MISSING_ANNOTATION, "true"), (PATH_ANNOTATION, "p")]);
        assert!(matches!(
            Policy::read("Service", &set, None),
            Err(TemplateError::RemoveMissingNotAllowed)
        ));
        assert!(Policy::read("Secret", &set, None).unwrap().remove_missing);
        assert!(Policy::read("ConfigMap", &set, None).unwrap().remove_missing);
    }

    #[test]
    fn versions_pass_through() {
        let policy = Policy::read(
            "Secret",
            &annotations(&[(KV_VERSION_ANNOTATION, "1"), (SECRET_VERSION_ANNOTATION, "4")]),
            Some("2"),
        )
        .unwrap();
        assert_eq!(
            policy.fetch_options(),
            FetchOptions {
                version: Some("4".into()),
                kv_version: Some("1".into()),
            }
        );

        let policy = Policy::read("Secret", &Annotations::new(), Some("2")).unwrap();
        assert_eq!(policy.kv_version.as_deref(), Some("2"));
        assert_eq!(policy.secret_version, None);
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "t", "T", "true", "TRUE", "True"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["", "0", "false", "yes", "tRuE"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn collect_merges_side_channel_over_metadata() {
        let manifest = json!({
            "metadata": {
                "annotations": {
                    PATH_ANNOTATION: "from/manifest",
                    IGNORE_ANNOTATION: true,
                    "unrelated": "x"
                }
            }
        });
        let side = annotations(&[(PATH_ANNOTATION, "from/side")]);
        let merged = collect_annotations(manifest.as_object().unwrap(), &side);

        assert_eq!(merged[PATH_ANNOTATION], "from/side");
        assert_eq!(merged[IGNORE_ANNOTATION], "true");
        assert_eq!(merged["unrelated"], "x");
    }

    #[test]
    fn collect_without_metadata_uses_side_channel() {
        let manifest = json!({"kind": "Secret"});
        let side = annotations(&[(PATH_ANNOTATION, "")]);
        let merged = collect_annotations(manifest.as_object().unwrap(), &side);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn regex_and_closure_validators() {
        let regex = Regex::new(r"^([A-Za-z/]*)$").unwrap();
        assert!(regex.allows("path/to/secret"));
        assert!(!regex.allows("path/to/secret-1"));

        let only_kv = |path: &str| path.starts_with("kv/");
        assert!(only_kv.allows("kv/app"));
        assert!(!only_kv.allows("secret/app"));
    }
}
