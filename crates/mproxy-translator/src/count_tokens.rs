//! Token-count rendering per client dialect family.

pub fn claude_token_count(count: i64) -> String {
    format!("{{\"input_tokens\":{count}}}")
}

pub fn gemini_token_count(count: i64) -> String {
    format!("{{\"totalTokens\":{count}}}")
}

pub fn openai_token_count(count: i64) -> String {
    format!("{{\"prompt_tokens\":{count},\"total_tokens\":{count}}}")
}

pub fn openai_responses_token_count(count: i64) -> String {
    format!("{{\"object\":\"response.input_tokens\",\"input_tokens\":{count}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_are_valid_json() {
        for render in [
            claude_token_count(12),
            gemini_token_count(12),
            openai_token_count(12),
            openai_responses_token_count(12),
        ] {
            let value: serde_json::Value = serde_json::from_str(&render).unwrap();
            assert!(value.is_object());
        }
    }
}
