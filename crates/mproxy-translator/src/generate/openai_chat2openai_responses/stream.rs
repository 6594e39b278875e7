use serde_json::{Value, json};

use crate::generate::util::epoch_seconds;
use crate::registry::TranslateContext;
use crate::sse::{SseEvent, data_payload};
use crate::state::StreamState;

/// Per-request state for OpenAI chat chunks → Responses stream events.
#[derive(Debug, Default)]
struct OpenAiChatToResponsesStream {
    response_id: Option<String>,
    model: Option<String>,
    created_at: i64,
    text: String,
    sequence: u64,
    finish_seen: bool,
    completed: bool,
}

impl OpenAiChatToResponsesStream {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

pub fn transform_stream(
    _ctx: &TranslateContext<'_>,
    model: &str,
    line: &str,
    state: &mut StreamState,
) -> Vec<SseEvent> {
    let state = state.get_or_insert_with(OpenAiChatToResponsesStream::default);
    let Some(payload) = data_payload(line) else {
        // A terminal marker with no trailing usage frame still has to close
        // the response lifecycle.
        if matches!(crate::sse::classify_line(line), crate::sse::SseLineKind::Data("[DONE]"))
            && state.finish_seen
            && !state.completed
        {
            state.completed = true;
            let sequence = state.next_sequence();
            return vec![SseEvent::named(
                "response.completed",
                serde_json::to_string(&json!({
                    "type": "response.completed",
                    "sequence_number": sequence,
                    "response": response_skeleton(state, "completed", None),
                }))
                .unwrap_or_default(),
            )];
        }
        return Vec::new();
    };
    let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };
    if state.completed {
        return Vec::new();
    }

    let mut out = Vec::new();

    if state.response_id.is_none() {
        let id = chunk
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        state.response_id = Some(format!("resp_{id}"));
        state.model = chunk
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| Some(model.to_string()));
        state.created_at = epoch_seconds();
        let sequence = state.next_sequence();
        out.push(SseEvent::named(
            "response.created",
            serde_json::to_string(&json!({
                "type": "response.created",
                "sequence_number": sequence,
                "response": response_skeleton(state, "in_progress", None),
            }))
            .unwrap_or_default(),
        ));
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
        state.text.push_str(text);
        let sequence = state.next_sequence();
        out.push(SseEvent::named(
            "response.output_text.delta",
            serde_json::to_string(&json!({
                "type": "response.output_text.delta",
                "sequence_number": sequence,
                "item_id": item_id(state),
                "output_index": 0,
                "content_index": 0,
                "delta": text,
            }))
            .unwrap_or_default(),
        ));
    }

    let finish_seen_before = state.finish_seen;
    if choice.get("finish_reason").and_then(Value::as_str).is_some() {
        state.finish_seen = true;
    }
    let usage = chunk.get("usage").filter(|usage| !usage.is_null()).cloned();
    // Chat streams deliver usage in a trailing empty-choice frame when
    // stream_options.include_usage is set; whichever of finish/usage arrives
    // last completes the response.
    if state.finish_seen && (usage.is_some() || finish_seen_before) {
        state.completed = true;
        let sequence = state.next_sequence();
        out.push(SseEvent::named(
            "response.completed",
            serde_json::to_string(&json!({
                "type": "response.completed",
                "sequence_number": sequence,
                "response": response_skeleton(state, "completed", usage.as_ref()),
            }))
            .unwrap_or_default(),
        ));
    }

    out
}

fn item_id(state: &OpenAiChatToResponsesStream) -> String {
    let id = state.response_id.as_deref().unwrap_or("resp_unknown");
    format!("msg_{}", id.trim_start_matches("resp_"))
}

fn response_skeleton(
    state: &OpenAiChatToResponsesStream,
    status: &str,
    usage: Option<&Value>,
) -> Value {
    let mut output = Vec::new();
    if status == "completed" && !state.text.is_empty() {
        output.push(json!({
            "type": "message",
            "id": item_id(state),
            "status": "completed",
            "role": "assistant",
            "content": [{"type": "output_text", "text": state.text, "annotations": []}],
        }));
    }
    let mut response = json!({
        "id": state.response_id.as_deref().unwrap_or("resp_unknown"),
        "object": "response",
        "created_at": state.created_at,
        "status": status,
        "model": state.model.as_deref().unwrap_or("unknown"),
        "output": output,
    });
    if let Some(usage) = usage
        && let Some(map) = response.as_object_mut()
    {
        map.insert("usage".to_string(), super::response::map_usage(usage));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_created_delta_completed() {
        let ctx = TranslateContext::default();
        let mut state = StreamState::new();
        let mut events = Vec::new();
        for line in [
            r#"data: {"id":"chatcmpl-7","model":"gpt-4.1","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            r#"data: {"id":"chatcmpl-7","choices":[{"index":0,"delta":{"content":"pong"}}]}"#,
            r#"data: {"id":"chatcmpl-7","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            r#"data: {"id":"chatcmpl-7","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
            "data: [DONE]",
        ] {
            events.extend(transform_stream(&ctx, "gpt-4.1", line, &mut state));
        }

        let names: Vec<&str> = events
            .iter()
            .filter_map(|event| event.event.as_deref())
            .collect();
        assert_eq!(
            names,
            [
                "response.created",
                "response.output_text.delta",
                "response.completed",
            ]
        );
        let completed: Value = serde_json::from_str(&events[2].data).unwrap();
        assert_eq!(completed["response"]["status"], "completed");
        assert_eq!(
            completed["response"]["output"][0]["content"][0]["text"],
            "pong"
        );
        assert_eq!(completed["response"]["usage"]["total_tokens"], 4);
    }
}
