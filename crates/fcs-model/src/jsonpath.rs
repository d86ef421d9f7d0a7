//! Dotted JSON path lookup (`Data.Account.0.AccountId`, `Data.Account.#`).

use serde_json::Value;

/// Resolve `path` against `root`.
///
/// Segments are object keys or array indexes. A `#` segment on an array
/// yields its length. An empty path returns `root`.
#[must_use]
pub fn lookup(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    let segments: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    };

    for (i, segment) in segments.iter().enumerate() {
        match current {
            Value::Array(items) if *segment == "#" => {
                return (i + 1 == segments.len()).then(|| Value::from(items.len()));
            }
            Value::Array(items) => {
                current = items.get(segment.parse::<usize>().ok()?)?;
            }
            Value::Object(map) => {
                current = map.get(*segment)?;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

/// Render a JSON value the way match rules compare it: strings unquoted,
/// everything else as compact JSON.
#[must_use]
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
