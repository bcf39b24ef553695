use serde_json::Value;

/// Resolve a dot-separated path (`"bundle.id"`) against a JSON value.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Collect every string found at `path`, flattening a single string or an
/// array of strings into a `Vec<String>`. Returns an empty vec if the path
/// is absent or neither a string nor an array of strings.
#[must_use]
pub fn collect_strings(value: &Value, path: &str) -> Vec<String> {
    match get_path(value, path) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}
