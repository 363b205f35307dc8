//! Placeholder substitution for Kubernetes manifests.
//!
//! A manifest is wrapped in a [`Template`], which reads the control
//! annotations, optionally bulk-fetches the secret named by the path
//! annotation, and on [`Template::replace`] walks the whole tree replacing
//! `<placeholder>` tokens:
//!
//! ```text
//! <name>                      bare, resolved from local values
//! <path:kv/data/app#key>      explicit, fetched from the backend
//! <path:kv/data/app#key#2>    explicit, pinned to version 2
//! ```

pub mod error;
pub mod placeholder;
pub mod policy;
pub mod render;
pub mod resolver;
pub mod resource;
pub mod safety;
mod walker;

pub use error::{ReplaceErrors, ReplaceFailure, TemplateError, REPLACE_ERROR_HEADER};
pub use placeholder::{Placeholder, Segment};
pub use policy::{
    Annotations, Mode, PathValidator, Policy, IGNORE_ANNOTATION, KV_VERSION_ANNOTATION,
    PATH_ANNOTATION, REMOVE_MISSING_ANNOTATION, SECRET_VERSION_ANNOTATION,
};
pub use render::OutputFormat;
pub use resource::{Resource, Template, TemplateBuilder};
