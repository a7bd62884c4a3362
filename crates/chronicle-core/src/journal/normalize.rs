//! Value normalization applied before any comparison.
//!
//! Transport and storage layers disagree on line endings, so every string is
//! compared with `CR LF` folded to `LF`. Blankness decides whether a value
//! counts as present at all.

use serde_json::Value;

use crate::model::journable::Attributes;

/// Rewrite `CR LF` to `LF` in every string value; other values pass through.
#[must_use]
pub fn normalize_newlines(attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), normalize_value(value)))
        .collect()
}

/// Normalize a single value.
#[must_use]
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.contains("\r\n") => Value::String(s.replace("\r\n", "\n")),
        other => other.clone(),
    }
}

/// `null`, whitespace-only strings, and empty arrays or objects are blank.
/// `false` and `0` are values.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Inverse of [`is_blank`].
#[must_use]
pub fn is_present(value: &Value) -> bool {
    !is_blank(value)
}
