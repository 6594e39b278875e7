use bytes::Bytes;
use http::StatusCode;
use serde_json::json;

use mproxy_provider::ExecutorError;
use mproxy_translator::{Dialect, Family, TranslateError};

/// Request-terminating failures, each with an HTTP status and an
/// upstream-style error body rendered in the client's dialect.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    TranslatorNotRegistered(TranslateError),
    #[error("request body could not be decoded ({len} bytes)")]
    Decode { len: usize },
    #[error("no usable credential for provider {provider}")]
    NoCredential { provider: String },
    #[error("no executor registered for provider {provider}")]
    ExecutorNotRegistered { provider: String },
    #[error("no route for model {model}")]
    ModelNotFound { model: String },
    #[error("upstream status {code}")]
    Upstream { code: u16, body: String },
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::TranslatorNotRegistered(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Decode { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NoCredential { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ExecutorNotRegistered { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Upstream { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::TranslatorNotRegistered(_) | GatewayError::ExecutorNotRegistered { .. } => {
                "server_error"
            }
            GatewayError::Decode { .. } => "invalid_request_error",
            GatewayError::NoCredential { .. } => "overloaded_error",
            GatewayError::ModelNotFound { .. } => "not_found_error",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::Internal(_) => "server_error",
        }
    }

    /// Error JSON in the shape the client dialect expects.
    pub fn to_body(&self, dialect: Dialect) -> Bytes {
        let message = match self {
            // Upstream bodies are passed through as the message so clients
            // see what the provider said.
            GatewayError::Upstream { body, .. } if !body.is_empty() => body.clone(),
            other => other.to_string(),
        };
        let value = match dialect.family() {
            Family::Claude => json!({
                "type": "error",
                "error": {"type": self.kind(), "message": message},
            }),
            Family::Gemini => json!({
                "error": {
                    "code": self.status().as_u16(),
                    "message": message,
                    "status": self.kind().to_ascii_uppercase(),
                },
            }),
            Family::OpenAIChat | Family::OpenAIResponses => json!({
                "error": {"message": message, "type": self.kind(), "code": null},
            }),
        };
        Bytes::from(value.to_string())
    }
}

impl From<TranslateError> for GatewayError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::NotRegistered { .. } => GatewayError::TranslatorNotRegistered(err),
            TranslateError::Decode { len } => GatewayError::Decode { len },
        }
    }
}

impl From<ExecutorError> for GatewayError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Status { code, body } => GatewayError::Upstream { code, body },
            ExecutorError::Translate(inner) => inner.into(),
            ExecutorError::Transport { message, .. } => GatewayError::Upstream {
                code: 502,
                body: message,
            },
            ExecutorError::Auth(message) => GatewayError::Upstream {
                code: 401,
                body: message,
            },
            ExecutorError::Scanner(message) => GatewayError::Upstream {
                code: 502,
                body: message,
            },
            ExecutorError::NotSupported(what) => GatewayError::Upstream {
                code: 501,
                body: format!("{what} is not supported"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_translator_body_names_the_pair() {
        let err = GatewayError::TranslatorNotRegistered(TranslateError::NotRegistered {
            from: Dialect::Windsurf,
            to: Dialect::Kiro,
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(err.to_body(Dialect::Windsurf).to_vec()).unwrap();
        assert!(body.contains("translator not registered for (windsurf, kiro)"));
    }

    #[test]
    fn no_credential_is_503_in_every_family() {
        let err = GatewayError::NoCredential {
            provider: "continue".to_string(),
        };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        for dialect in [Dialect::OpenAIChat, Dialect::Claude, Dialect::Gemini] {
            let body: serde_json::Value =
                serde_json::from_slice(&err.to_body(dialect)).unwrap();
            assert!(body.get("error").is_some());
        }
    }
}
