use serde_json::Value;

/// Render a JSON value as the text stored in the target's option table.
///
/// Booleans become `1`/`0`, `null` becomes the empty string, strings are kept
/// verbatim and everything else is stored as compact JSON.
pub fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
