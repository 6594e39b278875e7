use serde_json::{Map, Value, json};

use crate::generate::util::{parse_object, to_vec};
use crate::registry::TranslateError;

/// Convert a Gemini generateContent request into an OpenAI chat-completions
/// request. The Gemini model lives in the URL, so `model` comes from routing.
pub fn transform_request(
    model: &str,
    body: &[u8],
    stream: bool,
) -> Result<Vec<u8>, TranslateError> {
    let src = parse_object(body)?;
    let mut dst = Map::new();

    dst.insert("model".to_string(), Value::String(model.to_string()));

    let mut messages = Vec::new();
    let system = src
        .get("systemInstruction")
        .or_else(|| src.get("system_instruction"));
    if let Some(system) = system {
        let text = parts_text(system.get("parts"));
        if !text.is_empty() {
            messages.push(json!({"role": "system", "content": text}));
        }
    }

    let mut call_counter = 0u64;
    if let Some(contents) = src.get("contents").and_then(Value::as_array) {
        for content in contents {
            map_content(content, &mut messages, &mut call_counter);
        }
    }
    dst.insert("messages".to_string(), Value::Array(messages));

    if let Some(config) = src
        .get("generationConfig")
        .or_else(|| src.get("generation_config"))
    {
        if let Some(temperature) = config.get("temperature") {
            dst.insert("temperature".to_string(), temperature.clone());
        }
        if let Some(top_p) = config.get("topP") {
            dst.insert("top_p".to_string(), top_p.clone());
        }
        if let Some(max) = config.get("maxOutputTokens") {
            dst.insert("max_tokens".to_string(), max.clone());
        }
        if let Some(stop) = config.get("stopSequences") {
            dst.insert("stop".to_string(), stop.clone());
        }
    }

    if let Some(tools) = src.get("tools").and_then(Value::as_array) {
        let mut mapped = Vec::new();
        for tool in tools {
            if let Some(declarations) = tool
                .get("functionDeclarations")
                .or_else(|| tool.get("function_declarations"))
                .and_then(Value::as_array)
            {
                for declaration in declarations {
                    mapped.push(json!({"type": "function", "function": declaration.clone()}));
                }
            }
        }
        if !mapped.is_empty() {
            dst.insert("tools".to_string(), Value::Array(mapped));
        }
    }

    dst.insert("stream".to_string(), Value::Bool(stream));
    Ok(to_vec(dst))
}

fn map_content(content: &Value, out: &mut Vec<Value>, call_counter: &mut u64) {
    let role = content.get("role").and_then(Value::as_str).unwrap_or("user");
    let Some(parts) = content.get("parts").and_then(Value::as_array) else {
        return;
    };

    let mut text = String::new();
    for part in parts {
        if let Some(fragment) = part.get("text").and_then(Value::as_str) {
            text.push_str(fragment);
            continue;
        }
        if let Some(call) = part
            .get("functionCall")
            .or_else(|| part.get("function_call"))
        {
            *call_counter += 1;
            out.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": format!("call_{call_counter}"),
                    "type": "function",
                    "function": {
                        "name": call.get("name").and_then(Value::as_str).unwrap_or_default(),
                        "arguments": call
                            .get("args")
                            .map(|args| serde_json::to_string(args).unwrap_or_default())
                            .unwrap_or_else(|| "{}".to_string()),
                    },
                }],
            }));
            continue;
        }
        if let Some(response) = part
            .get("functionResponse")
            .or_else(|| part.get("function_response"))
        {
            out.push(json!({
                "role": "tool",
                "tool_call_id": response
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                "content": response
                    .get("response")
                    .map(|body| serde_json::to_string(body).unwrap_or_default())
                    .unwrap_or_default(),
            }));
        }
    }

    if !text.is_empty() {
        let mapped_role = if role == "model" { "assistant" } else { "user" };
        out.push(json!({"role": mapped_role, "content": text}));
    }
}

fn parts_text(parts: Option<&Value>) -> String {
    parts
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
