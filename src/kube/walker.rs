//! Depth-first placeholder substitution over a manifest tree.
//!
//! The walk never stops early. Every failed placeholder and every rejected
//! data value becomes one [`ReplaceFailure`] in the accumulator, and the
//! caller decides what to do with the list once the whole tree is visited.

use super::error::ReplaceFailure;
use super::placeholder::{self, Segment};
use super::policy::is_data_kind;
use super::resolver::{Resolution, Resolver};
use super::safety::is_yaml_safe_value;
use crate::backends::types::redact_secret;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Top-level mappings whose direct fields get data-field treatment on
/// Secret and ConfigMap resources.
const DATA_FIELDS: [&str; 2] = ["data", "stringData"];

/// Result of substituting the placeholders of one string.
#[derive(Debug, Default)]
struct Substitution {
    /// New value for the leaf, `None` when nothing was replaced.
    value: Option<Value>,
    /// Inner text of each placeholder with no value.
    missing: Vec<String>,
    /// Backend and path-validation failures.
    failures: Vec<ReplaceFailure>,
}

pub struct Walker<'a> {
    resolver: &'a Resolver<'a>,
    kind: &'a str,
    remove_missing: bool,
    failures: Vec<ReplaceFailure>,
}

impl<'a> Walker<'a> {
    pub fn new(resolver: &'a Resolver<'a>, kind: &'a str) -> Self {
        Self {
            resolver,
            kind,
            remove_missing: resolver.policy.remove_missing,
            failures: Vec::new(),
        }
    }

    /// Substitute every placeholder under `root` and return the collected
    /// failures.
    pub fn walk(mut self, root: &mut Map<String, Value>) -> Vec<ReplaceFailure> {
        let data_kind = is_data_kind(self.kind);

        for (key, value) in root.iter_mut() {
            match value {
                Value::Object(fields) if data_kind && DATA_FIELDS.contains(&key.as_str()) => {
                    let encoded = self.kind == "Secret" && key == "data";
                    self.walk_data(fields, encoded);
                }
                other => self.walk_value(key, other),
            }
        }

        self.failures
    }

    fn walk_value(&mut self, field: &str, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    self.walk_value(key, child);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.walk_value(field, item);
                }
            }
            Value::String(text) => {
                let sub = self.substitute(field, text);
                if let Some(new) = self.report(field, text, sub) {
                    *value = new;
                }
            }
            Value::Number(_) | Value::Bool(_) | Value::Null => {}
        }
    }

    /// Fields of a Secret/ConfigMap `data` or `stringData` mapping.
    fn walk_data(&mut self, fields: &mut Map<String, Value>, encoded: bool) {
        let mut removed = Vec::new();

        for (field, value) in fields.iter_mut() {
            let Value::String(text) = &mut *value else {
                self.walk_value(field, value);
                continue;
            };

            let (sub, decoded) = match decode_placeholders(text, encoded) {
                Some(plain) => (self.substitute(field, &plain), true),
                None => (self.substitute(field, text), false),
            };

            if self.remove_missing && !sub.missing.is_empty() {
                warn!(
                    "Removing key '{}' from {}: no value for {}",
                    field,
                    self.kind,
                    sub.missing.join(", ")
                );
                self.failures.extend(sub.failures);
                removed.push(field.clone());
                continue;
            }

            let Some(new) = self.report(field, text, sub) else {
                continue;
            };

            if decoded {
                *value = Value::String(STANDARD.encode(to_text(&new)));
            } else if !is_yaml_safe_value(&new) {
                self.failures.push(ReplaceFailure::BinaryContent {
                    field: field.clone(),
                    value: text.clone(),
                });
            } else {
                *value = new;
            }
        }

        for field in removed {
            fields.remove(&field);
        }
    }

    /// Move the failures of `sub` into the accumulator and hand back the new
    /// leaf value, if any.
    fn report(&mut self, field: &str, original: &str, sub: Substitution) -> Option<Value> {
        self.failures.extend(sub.failures);
        self.failures
            .extend(sub.missing.into_iter().map(|placeholder| ReplaceFailure::MissingValue {
                placeholder,
                field: field.to_string(),
                value: original.to_string(),
            }));
        sub.value
    }

    fn substitute(&self, field: &str, text: &str) -> Substitution {
        let segments = placeholder::parse(text);
        let mut sub = Substitution::default();

        if !segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder { .. }))
        {
            return sub;
        }

        let mut out = String::with_capacity(text.len());
        let mut replaced = 0usize;
        let mut whole = None;

        for segment in &segments {
            let (raw, inner, reference) = match segment {
                Segment::Literal(literal) => {
                    out.push_str(literal);
                    continue;
                }
                Segment::Placeholder {
                    raw,
                    inner,
                    reference,
                } => (*raw, *inner, reference),
            };

            match self.resolver.resolve(reference) {
                Resolution::Resolved(value) => {
                    let text = to_text(&value);
                    debug!("Substituted placeholder <{}> ({})", inner, redact_secret(&text));
                    out.push_str(&text);
                    replaced += 1;
                    whole = Some(value);
                }
                Resolution::Untouched => out.push_str(raw),
                Resolution::Missing => {
                    sub.missing.push(inner.to_string());
                    out.push_str(raw);
                }
                Resolution::Disallowed(path) => {
                    sub.failures.push(ReplaceFailure::PathDisallowed { path });
                    out.push_str(raw);
                }
                Resolution::Failed(message) => {
                    sub.failures.push(ReplaceFailure::Backend {
                        placeholder: inner.to_string(),
                        field: field.to_string(),
                        message,
                    });
                    out.push_str(raw);
                }
            }
        }

        if replaced == 0 {
            return sub;
        }

        // A lone placeholder keeps the resolved value's type.
        sub.value = match (segments.len(), whole) {
            (1, Some(value)) => Some(value),
            _ => Some(Value::String(out)),
        };
        sub
    }
}

/// Decode a base64 Secret `data` value that carries placeholders in its
/// plaintext.
pub(super) fn decode_placeholders(text: &str, encoded: bool) -> Option<String> {
    if !encoded || text.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(text).ok()?;
    let plain = String::from_utf8(bytes).ok()?;
    placeholder::contains_placeholder(&plain).then_some(plain)
}

/// Text form of a resolved value when spliced into a string.
fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
