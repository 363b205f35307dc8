//! Error types for manifest construction and placeholder replacement.

use crate::backends::BackendError;
use std::fmt;
use thiserror::Error;

/// Header line of every aggregate replacement error.
pub const REPLACE_ERROR_HEADER: &str = "could not replace all placeholders in Template:";

/// Errors raised while building or rendering a [`super::Resource`].
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The secret path was rejected by the path validation predicate.
    #[error("the path {path} is disallowed by AVP_PATH_VALIDATION restriction")]
    PathDisallowed { path: String },

    #[error("avp.kubernetes.io/remove-missing annotation can only be used on Secret or ConfigMap resources")]
    RemoveMissingNotAllowed,

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The eager bulk fetch failed.
    #[error("could not fetch secrets at '{path}': {source}")]
    Backend {
        path: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Replace(#[from] ReplaceErrors),

    #[error("could not render manifest: {0}")]
    Render(String),
}

impl TemplateError {
    pub fn invalid_manifest(msg: impl Into<String>) -> Self {
        Self::InvalidManifest(msg.into())
    }
}

/// One failed placeholder or rejected value found during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplaceFailure {
    #[error("missing value for placeholder {placeholder} in string {field}: {value}")]
    MissingValue {
        placeholder: String,
        field: String,
        value: String,
    },

    #[error("placeholder resolved to binary content in {field}: {value}")]
    BinaryContent { field: String, value: String },

    #[error("could not fetch {placeholder} for {field}: {message}")]
    Backend {
        placeholder: String,
        field: String,
        message: String,
    },

    #[error("the path {path} is disallowed by AVP_PATH_VALIDATION restriction")]
    PathDisallowed { path: String },
}

/// Every failure collected by one `replace` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceErrors {
    failures: Vec<ReplaceFailure>,
}

impl ReplaceErrors {
    pub fn new(failures: Vec<ReplaceFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[ReplaceFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ReplaceErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REPLACE_ERROR_HEADER)?;
        for failure in &self.failures {
            write!(f, "\n{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ReplaceErrors {}
