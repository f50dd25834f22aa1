//! Typed lookups over an opaque dynamic document tree
//!
//! Cluster documents are decoded into `serde_yaml::Value` trees. The helpers
//! in this module read nested fields by dotted path and tolerate missing keys
//! by returning sentinel zero values, so no caller needs schema knowledge
//! beyond the field paths it asks for.

use serde_yaml::Value;

static EMPTY_LIST: &[Value] = &[];

/// Resolves a dotted path (e.g. `status.conditions`) to the value it points
/// at, or `None` when any segment is missing or not a map.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_mapping()?.get(&Value::from(segment))?;
    }
    Some(current)
}

/// String at `path`, or `""` when absent. Scalars are rendered to text so
/// that e.g. numeric label values still read as strings.
pub fn string_at(root: &Value, path: &str) -> String {
    lookup(root, path).map(as_string).unwrap_or_default()
}

/// Integer at `path`, or `0` when absent or not a number.
pub fn int_at(root: &Value, path: &str) -> i64 {
    lookup(root, path).and_then(Value::as_i64).unwrap_or(0)
}

/// Bool at `path`, or `false` when absent.
pub fn bool_at(root: &Value, path: &str) -> bool {
    lookup(root, path).and_then(Value::as_bool).unwrap_or(false)
}

/// List at `path`, or the empty slice when absent or not a sequence.
pub fn list_at<'a>(root: &'a Value, path: &str) -> &'a [Value] {
    lookup(root, path)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or(EMPTY_LIST)
}

/// Renders a scalar value to its textual form; maps and lists yield `""`.
pub fn as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
