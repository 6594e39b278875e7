use serde_json::{Map, Value};

use crate::registry::TranslateError;

pub(crate) fn parse_object(body: &[u8]) -> Result<Map<String, Value>, TranslateError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(TranslateError::decode(body)),
    }
}

pub(crate) fn to_vec(map: Map<String, Value>) -> Vec<u8> {
    serde_json::to_vec(&Value::Object(map)).unwrap_or_default()
}

pub(crate) fn to_string(map: Map<String, Value>) -> String {
    serde_json::to_string(&Value::Object(map)).unwrap_or_default()
}

/// Copy a scalar field across when present, optionally under a new name.
pub(crate) fn copy_field(
    src: &Map<String, Value>,
    dst: &mut Map<String, Value>,
    from: &str,
    to: &str,
) {
    if let Some(value) = src.get(from) {
        dst.insert(to.to_string(), value.clone());
    }
}

pub(crate) fn epoch_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

/// Collapse a content value (plain string or block array) into visible text.
pub(crate) fn text_of_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block.get("type").and_then(Value::as_str) {
                Some("text") | Some("input_text") | Some("output_text") => {
                    block.get("text").and_then(Value::as_str)
                }
                None => block.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}
