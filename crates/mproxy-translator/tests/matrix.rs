use serde_json::Value;

use mproxy_translator::{
    Dialect, SseEvent, StreamState, TranslateContext, TranslatorRegistry,
};

#[test]
fn openai_chat_to_cursor_is_byte_identity_both_ways() {
    let registry = TranslatorRegistry::standard();
    let entry = registry.lookup(Dialect::OpenAIChat, Dialect::Cursor).unwrap();

    let request =
        br#"{"model":"gpt-4","messages":[{"role":"user","content":"ping"}],"stream":false}"#;
    let sent = (entry.request)("gpt-4", request, false).unwrap();
    assert_eq!(sent, request.to_vec());

    let response = br#"{"id":"c","choices":[{"message":{"role":"assistant","content":"pong"},"finish_reason":"stop"}]}"#;
    let mut state = StreamState::new();
    let returned = (entry.non_stream)(
        &TranslateContext::default(),
        "gpt-4",
        response,
        &mut state,
    )
    .unwrap();
    assert_eq!(returned.as_bytes(), response.as_slice());
}

#[test]
fn identity_pairs_round_trip_a_sample_corpus_byte_for_byte() {
    let registry = TranslatorRegistry::standard();
    let pairs = [
        (Dialect::OpenAIChat, Dialect::Cursor),
        (Dialect::Claude, Dialect::Kiro),
        (Dialect::Gemini, Dialect::GeminiCli),
        (Dialect::OpenAIResponses, Dialect::Codex),
    ];
    for (from, to) in pairs {
        let entry = registry.lookup(from, to).unwrap();
        for i in 0..20 {
            let request = format!(
                r#"{{"model":"model-{i}","messages":[{{"role":"user","content":"sample {i}"}}],"extra_{i}":{i},"stream":false}}"#
            );
            let sent = (entry.request)("model", request.as_bytes(), false).unwrap();
            assert_eq!(sent, request.as_bytes(), "request pass-through for {from}->{to}");

            let response = format!(r#"{{"id":"resp-{i}","vendor_field":{i},"payload":"p{i}"}}"#);
            let mut state = StreamState::new();
            let returned = (entry.non_stream)(
                &TranslateContext::default(),
                "model",
                response.as_bytes(),
                &mut state,
            )
            .unwrap();
            assert_eq!(returned, response, "response pass-through for {from}->{to}");
        }
    }
}

#[test]
fn claude_through_openai_chat_stream_preserves_five_deltas_in_order() {
    let registry = TranslatorRegistry::standard();
    let entry = registry.lookup(Dialect::Claude, Dialect::OpenAIChat).unwrap();

    // Client speaks Claude; the request leg produces an OpenAI body.
    let request = br#"{"model":"claude-sonnet-4","max_tokens":64,"messages":[{"role":"user","content":"count"}],"stream":true}"#;
    let sent = (entry.request)("gpt-4", request, true).unwrap();
    let sent_value: Value = serde_json::from_slice(&sent).unwrap();
    assert_eq!(sent_value["model"], "gpt-4");
    assert_eq!(sent_value["stream"], true);

    // Upstream answers with OpenAI chunks; the response leg must replay the
    // same five deltas as Claude content_block_delta events, in order.
    let ctx = TranslateContext {
        original_request: Some(request),
        translated_request: Some(&sent),
    };
    let mut state = StreamState::new();
    let mut events: Vec<SseEvent> = Vec::new();
    let first = r#"data: {"id":"chatcmpl-1","model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#.to_string();
    events.extend((entry.stream)(&ctx, "claude-sonnet-4", &first, &mut state));
    for i in 1..=5 {
        let line = format!(
            r#"data: {{"id":"chatcmpl-1","choices":[{{"index":0,"delta":{{"content":"{i}"}}}}]}}"#
        );
        events.extend((entry.stream)(&ctx, "claude-sonnet-4", &line, &mut state));
    }
    events.extend((entry.stream)(
        &ctx,
        "claude-sonnet-4",
        r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        &mut state,
    ));

    let deltas: Vec<String> = events
        .iter()
        .filter(|event| event.event.as_deref() == Some("content_block_delta"))
        .map(|event| {
            let value: Value = serde_json::from_str(&event.data).unwrap();
            value["delta"]["text"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(deltas, ["1", "2", "3", "4", "5"]);

    let names: Vec<&str> = events
        .iter()
        .filter_map(|event| event.event.as_deref())
        .collect();
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"message_stop"));
}

#[test]
fn pivoted_gemini_to_claude_request_matches_manual_two_stage() {
    let registry = TranslatorRegistry::standard();
    let body = br#"{"contents":[{"role":"user","parts":[{"text":"ping"}]}],"generationConfig":{"maxOutputTokens":32}}"#;

    let pivoted = registry.lookup(Dialect::Gemini, Dialect::Claude).unwrap();
    let direct_first = registry.lookup(Dialect::Gemini, Dialect::OpenAIChat).unwrap();
    let direct_second = registry.lookup(Dialect::OpenAIChat, Dialect::Claude).unwrap();

    let one_shot = (pivoted.request)("claude-sonnet-4", body, false).unwrap();
    let staged = {
        let mid = (direct_first.request)("claude-sonnet-4", body, false).unwrap();
        (direct_second.request)("claude-sonnet-4", &mid, false).unwrap()
    };
    assert_eq!(one_shot, staged);

    let value: Value = serde_json::from_slice(&one_shot).unwrap();
    assert_eq!(value["messages"][0]["content"], "ping");
    assert_eq!(value["max_tokens"], 32);
}

#[test]
fn pivoted_claude_upstream_stream_reaches_gemini_clients() {
    let registry = TranslatorRegistry::standard();
    let entry = registry.lookup(Dialect::Gemini, Dialect::Claude).unwrap();
    let ctx = TranslateContext::default();
    let mut state = StreamState::new();

    let mut events = Vec::new();
    for line in [
        r#"data: {"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4"}}"#,
        r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"pong"}}"#,
        r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"input_tokens":3,"output_tokens":1}}"#,
    ] {
        events.extend((entry.stream)(&ctx, "gemini-2.0-flash", line, &mut state));
    }

    let texts: Vec<String> = events
        .iter()
        .filter_map(|event| {
            let value: Value = serde_json::from_str(&event.data).ok()?;
            value["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .map(str::to_owned)
        })
        .collect();
    assert_eq!(texts, ["pong"]);

    let finish = events
        .iter()
        .filter_map(|event| serde_json::from_str::<Value>(&event.data).ok())
        .find_map(|value| {
            value["candidates"][0]["finishReason"]
                .as_str()
                .map(str::to_owned)
        });
    assert_eq!(finish.as_deref(), Some("STOP"));
}

#[test]
fn token_counts_render_in_the_client_dialect() {
    let registry = TranslatorRegistry::standard();

    let claude = registry.lookup(Dialect::Claude, Dialect::OpenAIChat).unwrap();
    let rendered: Value = serde_json::from_str(&(claude.token_count)(42)).unwrap();
    assert_eq!(rendered["input_tokens"], 42);

    let gemini = registry.lookup(Dialect::Gemini, Dialect::Claude).unwrap();
    let rendered: Value = serde_json::from_str(&(gemini.token_count)(7)).unwrap();
    assert_eq!(rendered["totalTokens"], 7);
}
