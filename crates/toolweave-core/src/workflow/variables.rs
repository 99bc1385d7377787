//! `$dotted.path` resolution against a JSON variable scope.
//!
//! Resolution never fails: a missing segment, an out-of-range index, or a
//! scalar in the middle of the path all yield `None`, which substitution turns
//! into JSON `null`.

use serde_json::Value;

/// Prefix marking a string as a variable reference.
pub const VARIABLE_PREFIX: char = '$';

/// Walk `path` (dot-separated, without the `$` prefix) through `scope`.
///
/// Object segments are looked up by key; when the current value is an array
/// and the segment parses as an index, the element at that index is taken.
pub fn resolve_path<'a>(path: &str, scope: &'a Value) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(scope, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Resolve a value that may be a `$` reference.
///
/// `$` strings resolve through the scope (cloned, `null` when absent); every
/// other value is returned as-is.
pub fn resolve_operand(value: &Value, scope: &Value) -> Value {
    match value {
        Value::String(s) if s.starts_with(VARIABLE_PREFIX) => resolve_path(&s[1..], scope)
            .cloned()
            .unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Deep-copy `value`, replacing every `$` string with its resolved value.
///
/// Objects and arrays are substituted recursively; other scalars pass through.
pub fn substitute(value: &Value, scope: &Value) -> Value {
    match value {
        Value::String(_) => resolve_operand(value, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Render a JSON value as plain text: strings unquoted, everything else as JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
