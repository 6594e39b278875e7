use serde_json::{Map, Value, json};

use crate::generate::util::{copy_field, parse_object, text_of_content, to_vec};
use crate::registry::TranslateError;

const DEFAULT_MAX_TOKENS: i64 = 4096;

/// Convert an OpenAI chat-completions request into a Claude create-message
/// request.
pub fn transform_request(
    model: &str,
    body: &[u8],
    stream: bool,
) -> Result<Vec<u8>, TranslateError> {
    let src = parse_object(body)?;
    let mut dst = Map::new();

    dst.insert("model".to_string(), Value::String(model.to_string()));

    let mut system = String::new();
    let mut messages: Vec<Value> = Vec::new();
    if let Some(items) = src.get("messages").and_then(Value::as_array) {
        for message in items {
            map_message(message, &mut system, &mut messages);
        }
    }
    if !system.is_empty() {
        dst.insert("system".to_string(), Value::String(system));
    }
    dst.insert("messages".to_string(), Value::Array(messages));

    let max_tokens = src
        .get("max_tokens")
        .or_else(|| src.get("max_completion_tokens"))
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_MAX_TOKENS);
    dst.insert("max_tokens".to_string(), json!(max_tokens));

    copy_field(&src, &mut dst, "temperature", "temperature");
    copy_field(&src, &mut dst, "top_p", "top_p");
    if let Some(stop) = src.get("stop") {
        let sequences = match stop {
            Value::String(single) => vec![Value::String(single.clone())],
            Value::Array(values) => values.clone(),
            _ => Vec::new(),
        };
        if !sequences.is_empty() {
            dst.insert("stop_sequences".to_string(), Value::Array(sequences));
        }
    }

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
    if let Some(effort) = src.get("reasoning_effort").and_then(Value::as_str) {
        dst.insert(
            "thinking".to_string(),
            json!({"type": "enabled", "budget_tokens": budget_for_effort(effort)}),
        );
    }

    dst.insert("stream".to_string(), Value::Bool(stream));
    Ok(to_vec(dst))
}

fn map_message(message: &Value, system: &mut String, out: &mut Vec<Value>) {
    let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
    match role {
        "system" | "developer" => {
            let text = message.get("content").map(text_of_content).unwrap_or_default();
            if !text.is_empty() {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&text);
            }
        }
        "assistant" => {
            let mut blocks = Vec::new();
            let text = message.get("content").map(text_of_content).unwrap_or_default();
            if !text.is_empty() {
                blocks.push(json!({"type": "text", "text": text}));
            }
            if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
                for call in calls {
                    let function = call.get("function").cloned().unwrap_or(Value::Null);
                    let input = function
                        .get("arguments")
                        .and_then(Value::as_str)
                        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                        .unwrap_or_else(|| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.get("id").and_then(Value::as_str).unwrap_or_default(),
                        "name": function
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default(),
                        "input": input,
                    }));
                }
            }
            if !blocks.is_empty() {
                out.push(json!({"role": "assistant", "content": blocks}));
            }
        }
        "tool" => {
            let block = json!({
                "type": "tool_result",
                "tool_use_id": message
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                "content": message.get("content").map(text_of_content).unwrap_or_default(),
            });
            // Claude expects tool results on a user turn; merge consecutive
            // results into one message.
            if let Some(last) = out.last_mut()
                && last.get("role").and_then(Value::as_str) == Some("user")
                && last
                    .get("content")
                    .and_then(Value::as_array)
                    .and_then(|blocks| blocks.first())
                    .and_then(|b| b.get("type"))
                    .and_then(Value::as_str)
                    == Some("tool_result")
            {
                if let Some(blocks) = last.get_mut("content").and_then(Value::as_array_mut) {
                    blocks.push(block);
                }
                return;
            }
            out.push(json!({"role": "user", "content": [block]}));
        }
        _ => {
            let text = message.get("content").map(text_of_content).unwrap_or_default();
            out.push(json!({"role": "user", "content": text}));
        }
    }
}

fn map_tool(tool: &Value) -> Option<Value> {
    let function = tool.get("function")?;
    let name = function.get("name").and_then(Value::as_str)?;
    let mut mapped = Map::new();
    mapped.insert("name".to_string(), Value::String(name.to_string()));
    if let Some(description) = function.get("description") {
        mapped.insert("description".to_string(), description.clone());
    }
    mapped.insert(
        "input_schema".to_string(),
        function
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object"})),
    );
    Some(Value::Object(mapped))
}

fn map_tool_choice(choice: &Value) -> Option<Value> {
    match choice {
        Value::String(mode) => match mode.as_str() {
            "auto" => Some(json!({"type": "auto"})),
            "required" => Some(json!({"type": "any"})),
            "none" => Some(json!({"type": "none"})),
            _ => None,
        },
        Value::Object(_) => choice
            .get("function")
            .and_then(|function| function.get("name"))
            .and_then(Value::as_str)
            .map(|name| json!({"type": "tool", "name": name})),
        _ => None,
    }
}

fn budget_for_effort(effort: &str) -> i64 {
    match effort {
        "low" => 1_024,
        "high" => 24_576,
        _ => 8_192,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_and_default_max_tokens() {
        let body = json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "ping"},
            ],
        });
        let out =
            transform_request("claude-sonnet-4", &serde_json::to_vec(&body).unwrap(), false)
                .unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(parsed["model"], "claude-sonnet-4");
        assert_eq!(parsed["system"], "be terse");
        assert_eq!(parsed["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(parsed["messages"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["stream"], false);
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_turn() {
        let body = json!({
            "model": "gpt-4",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "a", "arguments": "{}"}},
                    {"id": "call_2", "type": "function", "function": {"name": "b", "arguments": "{}"}},
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "one"},
                {"role": "tool", "tool_call_id": "call_2", "content": "two"},
            ],
        });
        let out =
            transform_request("claude-sonnet-4", &serde_json::to_vec(&body).unwrap(), false)
                .unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();

        let messages = parsed["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        let results = messages[1]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "call_1");
        assert_eq!(results[1]["tool_use_id"], "call_2");
    }

    #[test]
    fn tool_definitions_and_choice() {
        let body = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "x"}],
            "tools": [{"type": "function", "function": {
                "name": "get_weather",
                "parameters": {"type": "object"},
            }}],
            "tool_choice": {"type": "function", "function": {"name": "get_weather"}},
        });
        let out =
            transform_request("claude-sonnet-4", &serde_json::to_vec(&body).unwrap(), true)
                .unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["tools"][0]["name"], "get_weather");
        assert_eq!(parsed["tool_choice"]["type"], "tool");
        assert_eq!(parsed["tool_choice"]["name"], "get_weather");
        assert_eq!(parsed["stream"], true);
    }
}
