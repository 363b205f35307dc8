//! Text-safety check for values written into Secret/ConfigMap data.
//!
//! A value is safe when every character belongs to YAML's printable set, so
//! it can be emitted as a plain or quoted text scalar without escaping.

use serde_json::Value;

/// Whether `text` can be embedded as a YAML/JSON text scalar.
///
/// Tab, line feed and carriage return are the only control characters
/// allowed.
pub fn is_yaml_safe(text: &str) -> bool {
    first_unsafe_char(text).is_none()
}

/// Whether every string inside `value`, keys included, is YAML-safe.
pub fn is_yaml_safe_value(value: &Value) -> bool {
    match value {
        Value::String(s) => is_yaml_safe(s),
        Value::Array(items) => items.iter().all(is_yaml_safe_value),
        Value::Object(map) => map
            .iter()
            .all(|(key, child)| is_yaml_safe(key) && is_yaml_safe_value(child)),
        Value::Number(_) | Value::Bool(_) | Value::Null => true,
    }
}

/// Byte offset and value of the first character outside the printable set.
pub fn first_unsafe_char(text: &str) -> Option<(usize, char)> {
    text.char_indices().find(|&(_, c)| !is_printable(c))
}

fn is_printable(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\r'
            | '\u{20}'..='\u{7E}'
            | '\u{85}'
            | '\u{A0}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}
