//! Resolve one placeholder reference to a value.

use super::placeholder::Placeholder;
use super::policy::{PathValidator, Policy};
use crate::backends::{BackendError, SecretBackend};
use serde_json::{Map, Value};
use tracing::{debug, warn};

// ============================================================================
// Resolution outcome
// ============================================================================

/// Outcome of resolving a single placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Value),
    /// Lenient mode: an unknown bare name is left as literal text.
    Untouched,
    /// No value exists for the placeholder.
    Missing,
    /// The explicit path was rejected by the path validator.
    Disallowed(String),
    /// The backend failed for a reason other than a missing value.
    Failed(String),
}

/// Everything needed to resolve placeholders for one resource.
pub struct Resolver<'a> {
    pub policy: &'a Policy,
    pub values: &'a Map<String, Value>,
    pub backend: Option<&'a dyn SecretBackend>,
    pub validator: Option<&'a dyn PathValidator>,
}

impl Resolver<'_> {
    pub fn resolve(&self, reference: &Placeholder<'_>) -> Resolution {
        match *reference {
            Placeholder::Bare { name } => self.resolve_bare(name),
            Placeholder::Explicit { path, key, version } => {
                self.resolve_explicit(path, key, version)
            }
        }
    }

    fn resolve_bare(&self, name: &str) -> Resolution {
        match self.values.get(name) {
            Some(value) if !value.is_null() => Resolution::Resolved(value.clone()),
            _ if self.policy.is_strict() => Resolution::Missing,
            _ => {
                warn!("Leaving unresolved placeholder <{}> as text", name);
                Resolution::Untouched
            }
        }
    }

    fn resolve_explicit(&self, path: &str, key: &str, version: Option<&str>) -> Resolution {
        if let Some(validator) = self.validator {
            if !validator.allows(path) {
                return Resolution::Disallowed(path.to_string());
            }
        }

        let Some(backend) = self.backend else {
            return Resolution::Failed("no secret backend configured".to_string());
        };

        let options = self
            .policy
            .fetch_options()
            .with_version(version.map(String::from));

        debug!(
            "Fetching key '{}' from {} path '{}' (version {:?})",
            key,
            backend.name(),
            path,
            options.version
        );

        match backend.get_individual_secret(path, key, &options) {
            Ok(Some(value)) if !value.is_null() => Resolution::Resolved(value),
            Ok(_) | Err(BackendError::NotFound { .. }) => Resolution::Missing,
            Err(e) => Resolution::Failed(e.to_string()),
        }
    }
}
