use serde_json::{Map, Value, json};

use crate::generate::util::{parse_object, to_string};
use crate::registry::{TranslateContext, TranslateError};

/// Convert an OpenAI chat-completion response into a Claude message.
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

    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        content.push(json!({"type": "text", "text": text}));
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let input = function
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or_else(|| json!({}));
            content.push(json!({
                "type": "tool_use",
                "id": call.get("id").and_then(Value::as_str).unwrap_or_default(),
                "name": function.get("name").and_then(Value::as_str).unwrap_or_default(),
                "input": input,
            }));
        }
    }

    let stop_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(map_finish_reason)
        .unwrap_or("end_turn");

    let mut dst = Map::new();
    dst.insert(
        "id".to_string(),
        src.get("id").cloned().unwrap_or_else(|| json!("unknown")),
    );
    dst.insert("type".to_string(), json!("message"));
    dst.insert("role".to_string(), json!("assistant"));
    dst.insert(
        "model".to_string(),
        src.get("model").cloned().unwrap_or_else(|| json!(model)),
    );
    dst.insert("content".to_string(), Value::Array(content));
    dst.insert("stop_reason".to_string(), json!(stop_reason));
    dst.insert("stop_sequence".to_string(), Value::Null);
    if let Some(usage) = src.get("usage") {
        dst.insert(
            "usage".to_string(),
            json!({
                "input_tokens": usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
                "output_tokens": usage
                    .get("completion_tokens")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
            }),
        );
    }

    Ok(to_string(dst))
}

pub(super) fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        "content_filter" => "refusal",
        _ => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_becomes_message() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "pong"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9},
        });
        let out = transform_response(
            &TranslateContext::default(),
            "gpt-4",
            &serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["type"], "message");
        assert_eq!(parsed["content"][0]["text"], "pong");
        assert_eq!(parsed["stop_reason"], "end_turn");
        assert_eq!(parsed["usage"]["input_tokens"], 7);
        assert_eq!(parsed["usage"]["output_tokens"], 2);
    }

    #[test]
    fn tool_calls_become_tool_use_blocks() {
        let body = json!({
            "id": "chatcmpl-2",
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        });
        let out = transform_response(
            &TranslateContext::default(),
            "gpt-4",
            &serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["content"][0]["type"], "tool_use");
        assert_eq!(parsed["content"][0]["input"]["q"], "x");
        assert_eq!(parsed["stop_reason"], "tool_use");
    }
}
