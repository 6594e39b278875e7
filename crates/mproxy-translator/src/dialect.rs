use serde::{Deserialize, Serialize};

/// Wire dialect spoken by a client or an upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    OpenAIChat,
    OpenAIResponses,
    Claude,
    Gemini,
    GeminiCli,
    Codex,
    Cursor,
    Windsurf,
    Continue,
    Antigravity,
    Kiro,
}

/// The wire shape a dialect is compatible with.
///
/// Vendor dialects reuse one of the four public API shapes; translation is
/// implemented between families and same-family pairs are byte-identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    OpenAIChat,
    OpenAIResponses,
    Claude,
    Gemini,
}

impl Dialect {
    pub const ALL: [Dialect; 11] = [
        Dialect::OpenAIChat,
        Dialect::OpenAIResponses,
        Dialect::Claude,
        Dialect::Gemini,
        Dialect::GeminiCli,
        Dialect::Codex,
        Dialect::Cursor,
        Dialect::Windsurf,
        Dialect::Continue,
        Dialect::Antigravity,
        Dialect::Kiro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::OpenAIChat => "openai_chat",
            Dialect::OpenAIResponses => "openai_responses",
            Dialect::Claude => "claude",
            Dialect::Gemini => "gemini",
            Dialect::GeminiCli => "gemini_cli",
            Dialect::Codex => "codex",
            Dialect::Cursor => "cursor",
            Dialect::Windsurf => "windsurf",
            Dialect::Continue => "continue",
            Dialect::Antigravity => "antigravity",
            Dialect::Kiro => "kiro",
        }
    }

    pub fn parse(value: &str) -> Option<Dialect> {
        Dialect::ALL
            .into_iter()
            .find(|dialect| dialect.as_str() == value)
    }

    pub fn family(&self) -> Family {
        match self {
            Dialect::OpenAIChat | Dialect::Cursor | Dialect::Windsurf | Dialect::Continue => {
                Family::OpenAIChat
            }
            Dialect::OpenAIResponses | Dialect::Codex => Family::OpenAIResponses,
            Dialect::Claude | Dialect::Kiro => Family::Claude,
            Dialect::Gemini | Dialect::GeminiCli | Dialect::Antigravity => Family::Gemini,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
