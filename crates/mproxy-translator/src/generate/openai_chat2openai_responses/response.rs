use serde_json::{Map, Value, json};

use crate::generate::util::{epoch_seconds, parse_object, to_string};
use crate::registry::{TranslateContext, TranslateError};

/// Convert an OpenAI chat-completion response into a Responses object.
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

    let id = src
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let mut output = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        output.push(json!({
            "type": "message",
            "id": format!("msg_{id}"),
            "status": "completed",
            "role": "assistant",
            "content": [{"type": "output_text", "text": text, "annotations": []}],
        }));
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for (position, call) in calls.iter().enumerate() {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            output.push(json!({
                "type": "function_call",
                "id": format!("fc_{id}_{position}"),
                "call_id": call.get("id").and_then(Value::as_str).unwrap_or_default(),
                "name": function.get("name").and_then(Value::as_str).unwrap_or_default(),
                "arguments": function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}"),
                "status": "completed",
            }));
        }
    }

    let mut dst = Map::new();
    dst.insert("id".to_string(), json!(format!("resp_{id}")));
    dst.insert("object".to_string(), json!("response"));
    dst.insert("created_at".to_string(), json!(epoch_seconds()));
    dst.insert("status".to_string(), json!("completed"));
    dst.insert(
        "model".to_string(),
        src.get("model").cloned().unwrap_or_else(|| json!(model)),
    );
    dst.insert("output".to_string(), Value::Array(output));
    if let Some(usage) = src.get("usage") {
        dst.insert("usage".to_string(), map_usage(usage));
    }

    Ok(to_string(dst))
}

pub(super) fn map_usage(usage: &Value) -> Value {
    let input = usage
        .get("prompt_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let output = usage
        .get("completion_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let total = usage
        .get("total_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(input + output);
    json!({"input_tokens": input, "output_tokens": output, "total_tokens": total})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_becomes_response_object() {
        let body = json!({
            "id": "chatcmpl-5",
            "model": "gpt-4.1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "pong"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4},
        });
        let out = transform_response(
            &TranslateContext::default(),
            "gpt-4.1",
            &serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["id"], "resp_chatcmpl-5");
        assert_eq!(parsed["object"], "response");
        assert_eq!(parsed["output"][0]["content"][0]["text"], "pong");
        assert_eq!(parsed["usage"]["total_tokens"], 4);
    }

    #[test]
    fn tool_calls_become_function_call_items() {
        let body = json!({
            "id": "chatcmpl-6",
            "model": "gpt-4.1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "f", "arguments": "{\"a\":1}"},
                }]},
                "finish_reason": "tool_calls",
            }],
        });
        let out = transform_response(
            &TranslateContext::default(),
            "gpt-4.1",
            &serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["output"][0]["type"], "function_call");
        assert_eq!(parsed["output"][0]["call_id"], "call_1");
    }
}
