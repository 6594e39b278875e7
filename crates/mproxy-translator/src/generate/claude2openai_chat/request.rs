use serde_json::{Map, Value, json};

use crate::generate::util::{copy_field, parse_object, text_of_content, to_vec};
use crate::registry::TranslateError;

/// Convert a Claude create-message request into an OpenAI chat-completions
/// request.
pub fn transform_request(
    model: &str,
    body: &[u8],
    stream: bool,
) -> Result<Vec<u8>, TranslateError> {
    let src = parse_object(body)?;
    let mut dst = Map::new();

    dst.insert("model".to_string(), Value::String(model.to_string()));

    let mut messages = Vec::new();
    if let Some(system) = src.get("system") {
        let text = text_of_content(system);
        if !text.is_empty() {
            messages.push(json!({"role": "system", "content": text}));
        }
    }
    if let Some(items) = src.get("messages").and_then(Value::as_array) {
        for message in items {
            map_message(message, &mut messages);
        }
    }
    dst.insert("messages".to_string(), Value::Array(messages));

    copy_field(&src, &mut dst, "max_tokens", "max_tokens");
    copy_field(&src, &mut dst, "temperature", "temperature");
    copy_field(&src, &mut dst, "top_p", "top_p");
    copy_field(&src, &mut dst, "stop_sequences", "stop");

    if let Some(tools) = src.get("tools").and_then(Value::as_array) {
        let mapped: Vec<Value> = tools.iter().filter_map(map_tool).collect();
        if !mapped.is_empty() {
            dst.insert("tools".to_string(), Value::Array(mapped));
        }
    }
    if let Some(choice) = src.get("tool_choice")
        && let Some(mapped) = map_tool_choice(choice)
    {
        dst.insert("tool_choice".to_string(), mapped);
    }
    if let Some(budget) = src
        .get("thinking")
        .and_then(|thinking| thinking.get("budget_tokens"))
        .and_then(Value::as_i64)
    {
        dst.insert(
            "reasoning_effort".to_string(),
            Value::String(effort_for_budget(budget).to_string()),
        );
    }

    dst.insert("stream".to_string(), Value::Bool(stream));
    Ok(to_vec(dst))
}

fn map_message(message: &Value, out: &mut Vec<Value>) {
    let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
    let content = message.get("content").cloned().unwrap_or(Value::Null);

    match content {
        Value::String(text) => out.push(json!({"role": role, "content": text})),
        Value::Array(blocks) => match role {
            "assistant" => out.extend(map_assistant_blocks(&blocks)),
            _ => out.extend(map_user_blocks(&blocks)),
        },
        _ => {}
    }
}

fn map_assistant_blocks(blocks: &[Value]) -> Vec<Value> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") | Some("thinking") => {
                if let Some(part) = block
                    .get("text")
                    .or_else(|| block.get("thinking"))
                    .and_then(Value::as_str)
                {
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

    let mut message = Map::new();
    message.insert("role".to_string(), Value::String("assistant".to_string()));
    message.insert(
        "content".to_string(),
        if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        },
    );
    if !tool_calls.is_empty() {
        message.insert("tool_calls".to_string(), Value::Array(tool_calls));
    }
    vec![Value::Object(message)]
}

fn map_user_blocks(blocks: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut text = String::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(part) = block.get("text").and_then(Value::as_str) {
                    text.push_str(part);
                }
            }
            Some("tool_result") => {
                let content = block
                    .get("content")
                    .map(text_of_content)
                    .unwrap_or_default();
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    "content": content,
                }));
            }
            _ => {}
        }
    }
    if !text.is_empty() {
        out.push(json!({"role": "user", "content": text}));
    }
    out
}

fn map_tool(tool: &Value) -> Option<Value> {
    let name = tool.get("name").and_then(Value::as_str)?;
    let mut function = Map::new();
    function.insert("name".to_string(), Value::String(name.to_string()));
    if let Some(description) = tool.get("description") {
        function.insert("description".to_string(), description.clone());
    }
    if let Some(schema) = tool.get("input_schema") {
        function.insert("parameters".to_string(), schema.clone());
    }
    Some(json!({"type": "function", "function": Value::Object(function)}))
}

fn map_tool_choice(choice: &Value) -> Option<Value> {
    match choice.get("type").and_then(Value::as_str)? {
        "auto" => Some(Value::String("auto".to_string())),
        "any" => Some(Value::String("required".to_string())),
        "none" => Some(Value::String("none".to_string())),
        "tool" => choice.get("name").and_then(Value::as_str).map(|name| {
            json!({"type": "function", "function": {"name": name}})
        }),
        _ => None,
    }
}

fn effort_for_budget(budget: i64) -> &'static str {
    if budget < 4_096 {
        "low"
    } else if budget < 16_384 {
        "medium"
    } else {
        "high"
    }
}
