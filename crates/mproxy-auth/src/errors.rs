#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("device code request failed: {0}")]
    DeviceCode(String),
    #[error("device code has expired")]
    DeviceCodeExpired,
    #[error("authorization is pending")]
    AuthorizationPending,
    #[error("polling too frequently")]
    SlowDown,
    #[error("user denied authorization")]
    AccessDenied,
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("timeout waiting for user authorization")]
    PollingTimeout,
    #[error("user info request failed: {0}")]
    UserInfo(String),
    #[error("oauth error {code}: {description}")]
    OAuth { code: String, description: String },
}

impl AuthError {
    /// Human text shown to the operator. Raw provider error strings are
    /// never surfaced unchanged.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::DeviceCode(_) => {
                "Failed to start authentication. Please check your network connection and try again."
                    .to_string()
            }
            AuthError::DeviceCodeExpired => {
                "The authentication code has expired. Please try again.".to_string()
            }
            AuthError::AuthorizationPending => {
                "Waiting for you to authorize the application.".to_string()
            }
            AuthError::SlowDown => "Please wait a moment before trying again.".to_string(),
            AuthError::AccessDenied => "Authentication was cancelled or denied.".to_string(),
            AuthError::TokenExchange(_) => {
                "Failed to complete authentication. Please try again.".to_string()
            }
            AuthError::PollingTimeout => "Authentication timed out. Please try again.".to_string(),
            AuthError::UserInfo(_) => {
                "Failed to get your account information. Please try again.".to_string()
            }
            AuthError::OAuth { code, .. } => match code.as_str() {
                "access_denied" => "Authentication was cancelled or denied.".to_string(),
                "invalid_request" => "Invalid authentication request. Please try again.".to_string(),
                "server_error" => "Provider server error. Please try again later.".to_string(),
                _ => "Authentication failed. Please try again.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_messages_never_echo_the_provider_string() {
        let err = AuthError::OAuth {
            code: "weird_code".to_string(),
            description: "internal stacktrace gunk".to_string(),
        };
        let message = err.user_message();
        assert!(!message.contains("weird_code"));
        assert!(!message.contains("gunk"));
    }
}
