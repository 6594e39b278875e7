use serde_json::{Value, json};

use crate::registry::TranslateContext;
use crate::sse::{SseEvent, data_payload};
use crate::state::StreamState;

/// Per-request state for OpenAI chat-completion chunks → Claude SSE events.
///
/// Claude streams are block-structured, so this tracks which content block is
/// open and allocates block indexes as the flat OpenAI deltas arrive.
#[derive(Debug, Default)]
struct OpenAiChatToClaudeStream {
    started: bool,
    stopped: bool,
    open_block: Option<OpenBlock>,
    next_index: u64,
    output_tokens: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text(u64),
    Tool(u64),
}

impl OpenBlock {
    fn index(&self) -> u64 {
        match self {
            OpenBlock::Text(index) | OpenBlock::Tool(index) => *index,
        }
    }
}

pub fn transform_stream(
    _ctx: &TranslateContext<'_>,
    model: &str,
    line: &str,
    state: &mut StreamState,
) -> Vec<SseEvent> {
    let state = state.get_or_insert_with(OpenAiChatToClaudeStream::default);
    let Some(payload) = data_payload(line) else {
        return Vec::new();
    };
    let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };
    if state.stopped {
        return Vec::new();
    }

    let mut out = Vec::new();

    if !state.started {
        state.started = true;
        let id = chunk
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let model = chunk.get("model").and_then(Value::as_str).unwrap_or(model);
        out.push(named(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": id,
                    "type": "message",
                    "role": "assistant",
                    "model": model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0},
                },
            }),
        ));
    }

    if let Some(usage) = chunk.get("usage")
        && let Some(completion) = usage.get("completion_tokens").and_then(Value::as_i64)
    {
        state.output_tokens = completion;
    }

    let choice = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .cloned()
        .unwrap_or(Value::Null);
    let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

    if let Some(text) = delta.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        if !matches!(state.open_block, Some(OpenBlock::Text(_))) {
            close_block(state, &mut out);
            let index = state.next_index;
            state.next_index += 1;
            state.open_block = Some(OpenBlock::Text(index));
            out.push(named(
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": index,
                    "content_block": {"type": "text", "text": ""},
                }),
            ));
        }
        let index = state.open_block.as_ref().map(OpenBlock::index).unwrap_or(0);
        out.push(named(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": index,
                "delta": {"type": "text_delta", "text": text},
            }),
        ));
    }

    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let starts_call = call.get("id").and_then(Value::as_str).is_some()
                || function.get("name").and_then(Value::as_str).is_some();
            if starts_call {
                close_block(state, &mut out);
                let index = state.next_index;
                state.next_index += 1;
                state.open_block = Some(OpenBlock::Tool(index));
                out.push(named(
                    "content_block_start",
                    json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": {
                            "type": "tool_use",
                            "id": call.get("id").and_then(Value::as_str).unwrap_or_default(),
                            "name": function
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default(),
                            "input": {},
                        },
                    }),
                ));
            }
            if let Some(arguments) = function.get("arguments").and_then(Value::as_str)
                && !arguments.is_empty()
                && let Some(OpenBlock::Tool(index)) = state.open_block
            {
                out.push(named(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": {"type": "input_json_delta", "partial_json": arguments},
                    }),
                ));
            }
        }
    }

    if let Some(finish) = choice.get("finish_reason").and_then(Value::as_str) {
        close_block(state, &mut out);
        state.stopped = true;
        out.push(named(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": {
                    "stop_reason": super::response::map_finish_reason(finish),
                    "stop_sequence": null,
                },
                "usage": {"output_tokens": state.output_tokens},
            }),
        ));
        out.push(named("message_stop", json!({"type": "message_stop"})));
    }

    out
}

fn close_block(state: &mut OpenAiChatToClaudeStream, out: &mut Vec<SseEvent>) {
    if let Some(block) = state.open_block.take() {
        out.push(named(
            "content_block_stop",
            json!({"type": "content_block_stop", "index": block.index()}),
        ));
    }
}

fn named(name: &str, body: Value) -> SseEvent {
    SseEvent::named(name, serde_json::to_string(&body).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<SseEvent> {
        let ctx = TranslateContext::default();
        let mut state = StreamState::new();
        let mut out = Vec::new();
        for line in lines {
            out.extend(transform_stream(&ctx, "gpt-4", line, &mut state));
        }
        out
    }

    #[test]
    fn text_stream_produces_block_lifecycle() {
        let events = run(&[
            r#"data: {"id":"chatcmpl-1","model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"po"}}]}"#,
            r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"ng"}}]}"#,
            r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
            "data: [DONE]",
        ]);

        let names: Vec<&str> = events
            .iter()
            .filter_map(|event| event.event.as_deref())
            .collect();
        assert_eq!(
            names,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let delta: Value = serde_json::from_str(&events[2].data).unwrap();
        assert_eq!(delta["delta"]["text"], "po");
        let message_delta: Value = serde_json::from_str(&events[5].data).unwrap();
        assert_eq!(message_delta["delta"]["stop_reason"], "end_turn");
        assert_eq!(message_delta["usage"]["output_tokens"], 2);
    }

    #[test]
    fn delta_count_is_preserved_in_order() {
        let mut lines = vec![
            r#"data: {"id":"c","model":"m","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#
                .to_string(),
        ];
        for i in 0..5 {
            lines.push(format!(
                r#"data: {{"id":"c","choices":[{{"index":0,"delta":{{"content":"t{i}"}}}}]}}"#
            ));
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let events = run(&refs);
        let deltas: Vec<String> = events
            .iter()
            .filter(|event| event.event.as_deref() == Some("content_block_delta"))
            .map(|event| {
                let value: Value = serde_json::from_str(&event.data).unwrap();
                value["delta"]["text"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(deltas, ["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn tool_call_switches_blocks() {
        let events = run(&[
            r#"data: {"id":"c","model":"m","choices":[{"index":0,"delta":{"content":"thinking"}}]}"#,
            r#"data: {"id":"c","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"f","arguments":""}}]}}]}"#,
            r#"data: {"id":"c","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"x\":1}"}}]}}]}"#,
            r#"data: {"id":"c","choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);
        let names: Vec<&str> = events
            .iter()
            .filter_map(|event| event.event.as_deref())
            .collect();
        assert_eq!(
            names,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        let tool_start: Value = serde_json::from_str(&events[4].data).unwrap();
        assert_eq!(tool_start["content_block"]["type"], "tool_use");
        assert_eq!(tool_start["index"], 1);
        let message_delta: Value = serde_json::from_str(&events[7].data).unwrap();
        assert_eq!(message_delta["delta"]["stop_reason"], "tool_use");
    }
}
