//! Server-sent-event line utilities shared by translators and the dispatch
//! pipeline. Upstream bodies are consumed line by line; translators receive
//! individual lines and emit [`SseEvent`]s that the pipeline frames back onto
//! the wire.

/// One logical SSE event: an optional event name plus a data payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Render the event as a wire frame (`event:` line, `data:` line, blank
    /// separator).
    pub fn to_frame(&self) -> String {
        match &self.event {
            Some(name) => format!("event: {name}\ndata: {}\n\n", self.data),
            None => format!("data: {}\n\n", self.data),
        }
    }
}

/// Classification of a single upstream SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLineKind<'a> {
    /// `data: <payload>`
    Data(&'a str),
    /// `event: <name>`
    Event(&'a str),
    /// Blank separator line.
    Blank,
    /// Comment (`:` prefix) or any field this layer does not care about.
    Other,
}

pub fn classify_line(line: &str) -> SseLineKind<'_> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        return SseLineKind::Blank;
    }
    if line.starts_with(':') {
        return SseLineKind::Other;
    }
    if let Some(rest) = line.strip_prefix("data:") {
        return SseLineKind::Data(rest.strip_prefix(' ').unwrap_or(rest));
    }
    if let Some(rest) = line.strip_prefix("event:") {
        return SseLineKind::Event(rest.trim());
    }
    SseLineKind::Other
}

/// Extract the JSON payload of a `data:` line, ignoring `[DONE]` markers.
pub fn data_payload(line: &str) -> Option<&str> {
    match classify_line(line) {
        SseLineKind::Data(payload) if payload != "[DONE]" => Some(payload),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_handles_field_variants() {
        assert_eq!(classify_line("data: {\"a\":1}"), SseLineKind::Data("{\"a\":1}"));
        assert_eq!(classify_line("data:{\"a\":1}"), SseLineKind::Data("{\"a\":1}"));
        assert_eq!(
            classify_line("event: message_start"),
            SseLineKind::Event("message_start")
        );
        assert_eq!(classify_line(""), SseLineKind::Blank);
        assert_eq!(classify_line(": keep-alive"), SseLineKind::Other);
        assert_eq!(classify_line("id: 3"), SseLineKind::Other);
    }

    #[test]
    fn done_marker_is_not_a_payload() {
        assert_eq!(data_payload("data: [DONE]"), None);
        assert_eq!(data_payload("data: {}"), Some("{}"));
    }

    #[test]
    fn frames_include_event_name_when_present() {
        let event = SseEvent::named("ping", "{\"type\":\"ping\"}");
        assert_eq!(event.to_frame(), "event: ping\ndata: {\"type\":\"ping\"}\n\n");
        assert_eq!(SseEvent::data("{}").to_frame(), "data: {}\n\n");
    }
}
