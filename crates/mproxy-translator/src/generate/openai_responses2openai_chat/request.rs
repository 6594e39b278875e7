use serde_json::{Map, Value, json};

use crate::generate::util::{copy_field, parse_object, text_of_content, to_vec};
use crate::registry::TranslateError;

/// Convert an OpenAI Responses request into a chat-completions request.
pub fn transform_request(
    model: &str,
    body: &[u8],
    stream: bool,
) -> Result<Vec<u8>, TranslateError> {
    let src = parse_object(body)?;
    let mut dst = Map::new();

    dst.insert("model".to_string(), Value::String(model.to_string()));

    let mut messages = Vec::new();
    if let Some(instructions) = src.get("instructions").and_then(Value::as_str)
        && !instructions.is_empty()
    {
        messages.push(json!({"role": "system", "content": instructions}));
    }

    match src.get("input") {
        Some(Value::String(text)) => {
            messages.push(json!({"role": "user", "content": text}));
        }
        Some(Value::Array(items)) => {
            for item in items {
                map_input_item(item, &mut messages);
            }
        }
        _ => {}
    }
    dst.insert("messages".to_string(), Value::Array(messages));

    copy_field(&src, &mut dst, "max_output_tokens", "max_tokens");
    copy_field(&src, &mut dst, "temperature", "temperature");
    copy_field(&src, &mut dst, "top_p", "top_p");

    if let Some(tools) = src.get("tools").and_then(Value::as_array) {
        let mapped: Vec<Value> = tools.iter().filter_map(map_tool).collect();
        if !mapped.is_empty() {
            dst.insert("tools".to_string(), Value::Array(mapped));
        }
    }
    if let Some(choice) = src.get("tool_choice") {
        dst.insert("tool_choice".to_string(), choice.clone());
    }
    copy_field(&src, &mut dst, "reasoning_effort", "reasoning_effort");
    if let Some(effort) = src
        .get("reasoning")
        .and_then(|reasoning| reasoning.get("effort"))
    {
        dst.insert("reasoning_effort".to_string(), effort.clone());
    }

    dst.insert("stream".to_string(), Value::Bool(stream));
    Ok(to_vec(dst))
}

fn map_input_item(item: &Value, out: &mut Vec<Value>) {
    match item.get("type").and_then(Value::as_str) {
        Some("message") | None => {
            let role = item.get("role").and_then(Value::as_str).unwrap_or("user");
            let text = item.get("content").map(text_of_content).unwrap_or_default();
            out.push(json!({"role": role, "content": text}));
        }
        Some("function_call") => {
            out.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    "type": "function",
                    "function": {
                        "name": item.get("name").and_then(Value::as_str).unwrap_or_default(),
                        "arguments": item
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}"),
                    },
                }],
            }));
        }
        Some("function_call_output") => {
            out.push(json!({
                "role": "tool",
                "tool_call_id": item
                    .get("call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                "content": item.get("output").and_then(Value::as_str).unwrap_or_default(),
            }));
        }
        _ => {}
    }
}

fn map_tool(tool: &Value) -> Option<Value> {
    match tool.get("type").and_then(Value::as_str)? {
        "function" => {
            // Responses declares functions flat; chat nests them.
            let name = tool.get("name").and_then(Value::as_str)?;
            let mut function = Map::new();
            function.insert("name".to_string(), Value::String(name.to_string()));
            if let Some(description) = tool.get("description") {
                function.insert("description".to_string(), description.clone());
            }
            if let Some(parameters) = tool.get("parameters") {
                function.insert("parameters".to_string(), parameters.clone());
            }
            Some(json!({"type": "function", "function": Value::Object(function)}))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_input_becomes_user_message() {
        let body = json!({
            "model": "gpt-4.1",
            "instructions": "be terse",
            "input": "ping",
            "max_output_tokens": 128,
        });
        let out = transform_request("gpt-4.1", &serde_json::to_vec(&body).unwrap(), true).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["messages"][0]["role"], "system");
        assert_eq!(parsed["messages"][1]["content"], "ping");
        assert_eq!(parsed["max_tokens"], 128);
        assert_eq!(parsed["stream"], true);
    }

    #[test]
    fn function_items_round_into_tool_messages() {
        let body = json!({
            "model": "gpt-4.1",
            "input": [
                {"type": "message", "role": "user", "content": [{"type": "input_text", "text": "x"}]},
                {"type": "function_call", "call_id": "call_1", "name": "f", "arguments": "{}"},
                {"type": "function_call_output", "call_id": "call_1", "output": "ok"},
            ],
            "tools": [{"type": "function", "name": "f", "parameters": {"type": "object"}}],
        });
        let out = transform_request("gpt-4.1", &serde_json::to_vec(&body).unwrap(), false).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["messages"][1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(parsed["messages"][2]["role"], "tool");
        assert_eq!(parsed["tools"][0]["function"]["name"], "f");
    }
}
