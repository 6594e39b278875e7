use serde_json::{Map, Value, json};

use crate::generate::util::{epoch_seconds, parse_object, to_string};
use crate::registry::{TranslateContext, TranslateError};

/// Convert a Claude message response into an OpenAI chat-completion response.
pub fn transform_response(
    _ctx: &TranslateContext<'_>,
    model: &str,
    body: &[u8],
) -> Result<String, TranslateError> {
    let src = parse_object(body)?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    if let Some(blocks) = src.get("content").and_then(Value::as_array) {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(part) = block.get("text").and_then(Value::as_str) {
                        text.push_str(part);
                    }
                }
                Some("tool_use") => {
                    let arguments = block
                        .get("input")
                        .map(|input| serde_json::to_string(input).unwrap_or_default())
                        .unwrap_or_else(|| "{}".to_string());
                    tool_calls.push(json!({
                        "id": block.get("id").and_then(Value::as_str).unwrap_or_default(),
                        "type": "function",
                        "function": {
                            "name": block.get("name").and_then(Value::as_str).unwrap_or_default(),
                            "arguments": arguments,
                        },
                    }));
                }
                _ => {}
            }
        }
    }

    let mut message = Map::new();
    message.insert("role".to_string(), Value::String("assistant".to_string()));
    message.insert(
        "content".to_string(),
        if text.is_empty() && !tool_calls.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        },
    );
    if !tool_calls.is_empty() {
        message.insert("tool_calls".to_string(), Value::Array(tool_calls));
    }

    let finish_reason = src
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(map_stop_reason)
        .unwrap_or("stop");

    let mut dst = Map::new();
    dst.insert(
        "id".to_string(),
        src.get("id").cloned().unwrap_or_else(|| json!("unknown")),
    );
    dst.insert("object".to_string(), json!("chat.completion"));
    dst.insert("created".to_string(), json!(epoch_seconds()));
    dst.insert(
        "model".to_string(),
        src.get("model")
            .cloned()
            .unwrap_or_else(|| json!(model)),
    );
    dst.insert(
        "choices".to_string(),
        json!([{
            "index": 0,
            "message": Value::Object(message),
            "finish_reason": finish_reason,
        }]),
    );
    if let Some(usage) = src.get("usage") {
        let input = usage.get("input_tokens").and_then(Value::as_i64).unwrap_or(0);
        let output = usage
            .get("output_tokens")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        dst.insert(
            "usage".to_string(),
            json!({
                "prompt_tokens": input,
                "completion_tokens": output,
                "total_tokens": input + output,
            }),
        );
    }

    Ok(to_string(dst))
}

pub(super) fn map_stop_reason(reason: &str) -> &'static str {
    match reason {
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        "refusal" => "content_filter",
        _ => "stop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_message_to_completion() {
        let body = json!({
            "id": "msg_01",
            "model": "claude-sonnet-4",
            "content": [{"type": "text", "text": "pong"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 3},
        });
        let out = transform_response(
            &TranslateContext::default(),
            "claude-sonnet-4",
            &serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["id"], "msg_01");
        assert_eq!(parsed["object"], "chat.completion");
        assert_eq!(parsed["choices"][0]["message"]["content"], "pong");
        assert_eq!(parsed["choices"][0]["finish_reason"], "stop");
        assert_eq!(parsed["usage"]["total_tokens"], 13);
    }

    #[test]
    fn tool_use_maps_to_tool_calls_finish() {
        let body = json!({
            "id": "msg_02",
            "model": "claude-sonnet-4",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "f", "input": {"a": 1}}],
            "stop_reason": "tool_use",
        });
        let out = transform_response(
            &TranslateContext::default(),
            "claude-sonnet-4",
            &serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let message = &parsed["choices"][0]["message"];
        assert!(message["content"].is_null());
        assert_eq!(message["tool_calls"][0]["function"]["name"], "f");
        assert_eq!(parsed["choices"][0]["finish_reason"], "tool_calls");
    }
}
