use serde_json::{Map, Value, json};

use crate::registry::TranslateContext;
use crate::sse::{SseEvent, data_payload};
use crate::state::StreamState;

#[derive(Debug, Default)]
struct OpenAiChatToGeminiStream {
    model: Option<String>,
}

/// Convert OpenAI chat-completion chunks into Gemini streaming chunks
/// (`alt=sse` wire form: one JSON GenerateContentResponse per data line).
pub fn transform_stream(
    _ctx: &TranslateContext<'_>,
    model: &str,
    line: &str,
    state: &mut StreamState,
) -> Vec<SseEvent> {
    let state = state.get_or_insert_with(OpenAiChatToGeminiStream::default);
    let Some(payload) = data_payload(line) else {
        return Vec::new();
    };
    let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    if state.model.is_none() {
        state.model = chunk
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_owned);
    }

    let choice = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .cloned()
        .unwrap_or(Value::Null);
    let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

    let mut parts = Vec::new();
    if let Some(text) = delta.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        parts.push(json!({"text": text}));
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                let args = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                    .unwrap_or_else(|| json!({}));
                parts.push(json!({"functionCall": {"name": name, "args": args}}));
            }
        }
    }

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(super::response::map_finish_reason);
    let usage = chunk.get("usage").filter(|usage| !usage.is_null());

    if parts.is_empty() && finish_reason.is_none() && usage.is_none() {
        return Vec::new();
    }

    let mut candidate = Map::new();
    candidate.insert(
        "content".to_string(),
        json!({"role": "model", "parts": parts}),
    );
    if let Some(reason) = finish_reason {
        candidate.insert("finishReason".to_string(), json!(reason));
    }
    candidate.insert("index".to_string(), json!(0));

    let mut body = Map::new();
    body.insert(
        "candidates".to_string(),
        Value::Array(vec![Value::Object(candidate)]),
    );
    if let Some(usage) = usage {
        body.insert(
            "usageMetadata".to_string(),
            super::response::map_usage(usage),
        );
    }
    if let Some(model) = state.model.as_deref().or(Some(model)) {
        body.insert("modelVersion".to_string(), json!(model));
    }

    vec![SseEvent::data(
        serde_json::to_string(&Value::Object(body)).unwrap_or_default(),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_become_gemini_chunks() {
        let ctx = TranslateContext::default();
        let mut state = StreamState::new();

        let first = transform_stream(
            &ctx,
            "gemini-2.0-flash",
            r#"data: {"id":"c","model":"gpt-4","choices":[{"index":0,"delta":{"content":"hel"}}]}"#,
            &mut state,
        );
        assert_eq!(first.len(), 1);
        let value: Value = serde_json::from_str(&first[0].data).unwrap();
        assert_eq!(value["candidates"][0]["content"]["parts"][0]["text"], "hel");

        let role_only = transform_stream(
            &ctx,
            "gemini-2.0-flash",
            r#"data: {"id":"c","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            &mut state,
        );
        assert!(role_only.is_empty());

        let finish = transform_stream(
            &ctx,
            "gemini-2.0-flash",
            r#"data: {"id":"c","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":2,"completion_tokens":1,"total_tokens":3}}"#,
            &mut state,
        );
        let value: Value = serde_json::from_str(&finish[0].data).unwrap();
        assert_eq!(value["candidates"][0]["finishReason"], "STOP");
        assert_eq!(value["usageMetadata"]["totalTokenCount"], 3);
    }
}
