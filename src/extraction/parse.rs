use serde_json::{Map, Value};

use crate::error::ExtractionError;

/// Pulls the JSON object out of a model answer. Models tend to wrap the
/// object in prose or code fences, so the outermost `{ ... }` span wins;
/// without one the whole trimmed text must parse.
pub fn parse_fields(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    };

    match serde_json::from_str::<Value>(candidate)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(ExtractionError::NotAnObject),
    }
}
