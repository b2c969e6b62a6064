//! Adapter content coercion.
//!
//! Upstream payloads are not reliably strings: some adapters return
//! structured objects, arrays of chunks, or a stringified
//! `[object Object]`. Every content field is coerced to a string before
//! storage and round-trip.

use serde_json::Value;

/// Marker left behind by a lossy upstream stringification.
const OBJECT_OBJECT: &str = "[object Object]";

/// Extraction keys tried, in order, on structured payloads.
const TEXT_KEYS: [&str; 3] = ["text", "content", "message"];

/// Coerce an adapter content value to a string.
///
/// Strings pass through. Objects yield the first string field among
/// `text`, `content`, `message` (a nested object under those keys is
/// descended into); arrays of strings join with newlines. Anything else,
/// including objects with no usable text field, serializes canonically.
#[must_use]
pub fn coerce_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(_) => extract_text(value)
            .unwrap_or_else(|| serde_json::to_string(value).unwrap_or_default()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(coerce_content).collect();
            parts.join("\n")
        }
        other => other.to_string(),
    }
}

/// Pull a usable text field out of a structured payload.
fn extract_text(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    for key in TEXT_KEYS {
        match map.get(key) {
            Some(Value::String(s)) if s != OBJECT_OBJECT => return Some(s.clone()),
            // A lossy stringification is discarded in favor of the
            // canonical serialization of the whole payload.
            Some(Value::String(_)) => return None,
            Some(nested @ Value::Object(_)) => {
                if let Some(text) = extract_text(nested) {
                    return Some(text);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_passes_through() {
        assert_eq!(coerce_content(&json!("Paris is the capital")), "Paris is the capital");
    }

    #[test]
    fn object_yields_first_text_field() {
        assert_eq!(coerce_content(&json!({"text": "answer", "other": 1})), "answer");
        assert_eq!(coerce_content(&json!({"content": "answer"})), "answer");
        assert_eq!(coerce_content(&json!({"message": "answer"})), "answer");
    }

    #[test]
    fn nested_message_object_is_descended() {
        let value = json!({"message": {"content": "nested answer"}});
        assert_eq!(coerce_content(&value), "nested answer");
    }

    #[test]
    fn object_object_marker_falls_back_to_serialization() {
        let value = json!({"text": "[object Object]", "data": 42});
        let coerced = coerce_content(&value);
        assert!(coerced.contains("\"data\":42"));
        assert_ne!(coerced, "[object Object]");
    }

    #[test]
    fn object_without_text_fields_serializes() {
        let value = json!({"choices": [1, 2]});
        assert_eq!(coerce_content(&value), value.to_string());
    }

    #[test]
    fn string_array_joins_with_newlines() {
        assert_eq!(coerce_content(&json!(["a", "b"])), "a\nb");
    }

    #[test]
    fn null_and_scalars_are_stringified() {
        assert_eq!(coerce_content(&Value::Null), "");
        assert_eq!(coerce_content(&json!(12)), "12");
        assert_eq!(coerce_content(&json!(true)), "true");
    }
}
