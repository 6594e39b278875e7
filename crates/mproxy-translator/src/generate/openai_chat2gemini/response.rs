use serde_json::{Map, Value, json};

use crate::generate::util::{parse_object, to_string};
use crate::registry::{TranslateContext, TranslateError};

/// Convert an OpenAI chat-completion response into a Gemini generateContent
/// response.
pub fn transform_response(
    _ctx: &TranslateContext<'_>,
    model: &str,
    body: &[u8],
) -> Result<String, TranslateError> {
    let src = parse_object(body)?;
    let choice = src
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .cloned()
        .unwrap_or(Value::Null);
    let message = choice.get("message").cloned().unwrap_or(Value::Null);

    let mut parts = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        parts.push(json!({"text": text}));
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let args = function
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or_else(|| json!({}));
            parts.push(json!({"functionCall": {
                "name": function.get("name").and_then(Value::as_str).unwrap_or_default(),
                "args": args,
            }}));
        }
    }

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(map_finish_reason)
        .unwrap_or("STOP");

    let mut dst = Map::new();
    dst.insert(
        "candidates".to_string(),
        json!([{
            "content": {"role": "model", "parts": parts},
            "finishReason": finish_reason,
            "index": 0,
        }]),
    );
    if let Some(usage) = src.get("usage") {
        dst.insert("usageMetadata".to_string(), map_usage(usage));
    }
    dst.insert(
        "modelVersion".to_string(),
        src.get("model").cloned().unwrap_or_else(|| json!(model)),
    );

    Ok(to_string(dst))
}

pub(super) fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "length" => "MAX_TOKENS",
        "content_filter" => "SAFETY",
        _ => "STOP",
    }
}

pub(super) fn map_usage(usage: &Value) -> Value {
    let prompt = usage
        .get("prompt_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let completion = usage
        .get("completion_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let total = usage
        .get("total_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(prompt + completion);
    json!({
        "promptTokenCount": prompt,
        "candidatesTokenCount": completion,
        "totalTokenCount": total,
    })
}
