use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::generate::util::epoch_seconds;
use crate::registry::TranslateContext;
use crate::sse::{SseEvent, data_payload};
use crate::state::StreamState;

/// Per-request state for Claude SSE → OpenAI chat-completion chunks.
///
/// Claude names its events but every data payload also carries a `type`
/// discriminator, so the event lines themselves can be ignored.
#[derive(Debug)]
struct ClaudeToOpenAiChatStream {
    id: String,
    model: String,
    created: i64,
    tool_calls: BTreeMap<u64, (String, String)>,
    finish_emitted: bool,
}

impl ClaudeToOpenAiChatStream {
    fn new() -> Self {
        Self {
            id: "unknown".to_string(),
            model: "unknown".to_string(),
            created: epoch_seconds(),
            tool_calls: BTreeMap::new(),
            finish_emitted: false,
        }
    }
}

pub fn transform_stream(
    _ctx: &TranslateContext<'_>,
    model: &str,
    line: &str,
    state: &mut StreamState,
) -> Vec<SseEvent> {
    let state = state.get_or_insert_with(ClaudeToOpenAiChatStream::new);
    let Some(payload) = data_payload(line) else {
        return Vec::new();
    };
    let Ok(event) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    match event.get("type").and_then(Value::as_str) {
        Some("message_start") => {
            if let Some(message) = event.get("message") {
                if let Some(id) = message.get("id").and_then(Value::as_str) {
                    state.id = id.to_string();
                }
                state.model = message
                    .get("model")
                    .and_then(Value::as_str)
                    .unwrap_or(model)
                    .to_string();
            }
            vec![chunk(state, json!({"role": "assistant", "content": ""}), None, None)]
        }
        Some("content_block_start") => {
            let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
            let Some(block) = event.get("content_block") else {
                return Vec::new();
            };
            match block.get("type").and_then(Value::as_str) {
                Some("text") | Some("thinking") => {
                    let text = block
                        .get("text")
                        .or_else(|| block.get("thinking"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        vec![chunk(state, json!({"content": text}), None, None)]
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    state
                        .tool_calls
                        .insert(index, (id.to_string(), name.to_string()));
                    vec![chunk(
                        state,
                        json!({"tool_calls": [{
                            "index": index,
                            "id": id,
                            "type": "function",
                            "function": {"name": name, "arguments": ""},
                        }]}),
                        None,
                        None,
                    )]
                }
                _ => Vec::new(),
            }
        }
        Some("content_block_delta") => {
            let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
            let Some(delta) = event.get("delta") else {
                return Vec::new();
            };
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") | Some("thinking_delta") => {
                    let text = delta
                        .get("text")
                        .or_else(|| delta.get("thinking"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        vec![chunk(state, json!({"content": text}), None, None)]
                    }
                }
                Some("input_json_delta") => {
                    let partial = delta
                        .get("partial_json")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if partial.is_empty() {
                        return Vec::new();
                    }
                    vec![chunk(
                        state,
                        json!({"tool_calls": [{
                            "index": index,
                            "type": "function",
                            "function": {"arguments": partial},
                        }]}),
                        None,
                        None,
                    )]
                }
                _ => Vec::new(),
            }
        }
        Some("message_delta") => {
            let finish = event
                .get("delta")
                .and_then(|delta| delta.get("stop_reason"))
                .and_then(Value::as_str)
                .map(super::response::map_stop_reason);
            let usage = event.get("usage").and_then(map_usage);
            if finish.is_none() && usage.is_none() {
                return Vec::new();
            }
            if finish.is_some() {
                state.finish_emitted = true;
            }
            vec![chunk(state, json!({}), finish, usage)]
        }
        Some("message_stop") => {
            if state.finish_emitted {
                Vec::new()
            } else {
                state.finish_emitted = true;
                vec![chunk(state, json!({}), Some("stop"), None)]
            }
        }
        Some("error") => {
            let error = event.get("error").cloned().unwrap_or(Value::Null);
            vec![SseEvent::data(
                serde_json::to_string(&json!({"error": error})).unwrap_or_default(),
            )]
        }
        // ping and content_block_stop carry nothing the chat shape needs.
        _ => Vec::new(),
    }
}

fn map_usage(usage: &Value) -> Option<Value> {
    let input = usage.get("input_tokens").and_then(Value::as_i64);
    let output = usage.get("output_tokens").and_then(Value::as_i64);
    if input.is_none() && output.is_none() {
        return None;
    }
    let input = input.unwrap_or(0);
    let output = output.unwrap_or(0);
    Some(json!({
        "prompt_tokens": input,
        "completion_tokens": output,
        "total_tokens": input + output,
    }))
}

fn chunk(
    state: &ClaudeToOpenAiChatStream,
    delta: Value,
    finish_reason: Option<&str>,
    usage: Option<Value>,
) -> SseEvent {
    let mut body = Map::new();
    body.insert("id".to_string(), json!(state.id));
    body.insert("object".to_string(), json!("chat.completion.chunk"));
    body.insert("created".to_string(), json!(state.created));
    body.insert("model".to_string(), json!(state.model));
    body.insert(
        "choices".to_string(),
        json!([{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }]),
    );
    if let Some(usage) = usage {
        body.insert("usage".to_string(), usage);
    }
    SseEvent::data(serde_json::to_string(&Value::Object(body)).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<Value> {
        let ctx = TranslateContext::default();
        let mut state = StreamState::new();
        let mut out = Vec::new();
        for line in lines {
            for event in transform_stream(&ctx, "claude-sonnet-4", line, &mut state) {
                out.push(serde_json::from_str(&event.data).unwrap());
            }
        }
        out
    }

    #[test]
    fn full_message_lifecycle() {
        let chunks = run(&[
            "event: message_start",
            r#"data: {"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4","usage":{"input_tokens":9}}}"#,
            "event: content_block_delta",
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"po"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ng"}}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"input_tokens":9,"output_tokens":2}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "po");
        assert_eq!(chunks[2]["choices"][0]["delta"]["content"], "ng");
        assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
        assert_eq!(chunks[3]["usage"]["total_tokens"], 11);
        for chunk in &chunks {
            assert_eq!(chunk["id"], "msg_1");
        }
    }

    #[test]
    fn tool_use_deltas_keep_index() {
        let chunks = run(&[
            r#"data: {"type":"message_start","message":{"id":"msg_2","model":"m"}}"#,
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"lookup"}}"#,
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\":"}}"#,
        ]);
        assert_eq!(chunks.len(), 3);
        let start = &chunks[1]["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(start["index"], 1);
        assert_eq!(start["function"]["name"], "lookup");
        let delta = &chunks[2]["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(delta["function"]["arguments"], "{\"q\":");
    }

    #[test]
    fn message_stop_without_finish_synthesizes_stop() {
        let chunks = run(&[
            r#"data: {"type":"message_start","message":{"id":"msg_3","model":"m"}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]);
        assert_eq!(chunks.last().unwrap()["choices"][0]["finish_reason"], "stop");
    }
}
