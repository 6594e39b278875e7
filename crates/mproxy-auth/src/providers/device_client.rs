use std::time::Duration;

use serde_json::{Value, json};
use tracing::warn;

use mproxy_common::Config;

use crate::authenticator::LoginOptions;
use crate::credential::Auth;
use crate::device_flow::{DeviceCode, PollOutcome, TokenData, poll_for_token};
use crate::errors::AuthError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn encode_form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Endpoints and client identity for one provider's device flow.
#[derive(Debug, Clone, Copy)]
pub struct DeviceFlowEndpoints {
    pub provider: &'static str,
    pub client_id: &'static str,
    pub scope: &'static str,
    pub device_code_url: &'static str,
    pub token_url: &'static str,
    pub user_info_url: &'static str,
}

/// HTTP client for the RFC 8628 grant against one provider.
pub struct DeviceFlowClient {
    http: wreq::Client,
    endpoints: DeviceFlowEndpoints,
}

impl DeviceFlowClient {
    pub fn new(config: &Config, endpoints: DeviceFlowEndpoints) -> Result<Self, AuthError> {
        let mut builder = wreq::Client::builder().timeout(HTTP_TIMEOUT);
        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.proxy(
                wreq::Proxy::all(proxy)
                    .map_err(|err| AuthError::DeviceCode(err.to_string()))?,
            );
        }
        let http = builder
            .build()
            .map_err(|err| AuthError::DeviceCode(err.to_string()))?;
        Ok(Self { http, endpoints })
    }

    pub async fn request_device_code(&self) -> Result<DeviceCode, AuthError> {
        let form = encode_form(&[
            ("client_id", self.endpoints.client_id),
            ("scope", self.endpoints.scope),
        ]);
        let response = self
            .http
            .post(self.endpoints.device_code_url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|err| AuthError::DeviceCode(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::DeviceCode(err.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(AuthError::DeviceCode(format!("status {status}")));
        }
        serde_json::from_slice(&body).map_err(|err| AuthError::DeviceCode(err.to_string()))
    }

    async fn exchange_device_code(&self, device_code: &str) -> Result<PollOutcome, AuthError> {
        let form = encode_form(&[
            ("client_id", self.endpoints.client_id),
            ("device_code", device_code),
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
        ]);
        let response = self
            .http
            .post(self.endpoints.token_url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;
        PollOutcome::from_wire(&body)
    }

    pub async fn wait_for_authorization(
        &self,
        device_code: &DeviceCode,
    ) -> Result<TokenData, AuthError> {
        poll_for_token(device_code, || {
            self.exchange_device_code(&device_code.device_code)
        })
        .await
    }

    /// Fetch `username`/`email` to label the credential.
    pub async fn fetch_user_label(&self, access_token: &str) -> Result<String, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::UserInfo("access token is empty".to_string()));
        }
        let response = self
            .http
            .get(self.endpoints.user_info_url)
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| AuthError::UserInfo(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::UserInfo(err.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(AuthError::UserInfo(format!("status {status}")));
        }
        let value: Value =
            serde_json::from_slice(&body).map_err(|err| AuthError::UserInfo(err.to_string()))?;
        let username = value.get("username").and_then(Value::as_str).unwrap_or("");
        let email = value.get("email").and_then(Value::as_str).unwrap_or("");
        if username.is_empty() && email.is_empty() {
            return Err(AuthError::UserInfo("empty username and email".to_string()));
        }
        Ok(if username.is_empty() {
            email.to_string()
        } else {
            username.to_string()
        })
    }

    /// Run the full login: device code, prompt, poll, user label, bundle.
    pub async fn login(&self, opts: &LoginOptions) -> Result<Auth, AuthError> {
        let device_code = self.request_device_code().await?;
        opts.display.show(
            &device_code.verification_uri,
            &device_code.user_code,
            device_code.expires_in,
        );
        if !opts.no_browser
            && let Err(err) = opts.browser.open(&device_code.verification_uri)
        {
            warn!(provider = self.endpoints.provider, error = %err, "failed to open browser");
        }

        let token = self.wait_for_authorization(&device_code).await?;
        let label = match self.fetch_user_label(&token.access_token).await {
            Ok(label) => label,
            Err(err) => {
                warn!(provider = self.endpoints.provider, error = %err, "failed to fetch user info");
                "unknown".to_string()
            }
        };

        Ok(self.bundle(&token, label))
    }

    fn bundle(&self, token: &TokenData, label: String) -> Auth {
        let mut auth = Auth::new(self.endpoints.provider, &label);
        auth.set_access_token(&token.access_token);
        auth.metadata
            .insert("token_type".to_string(), json!(token.token_type));
        auth.metadata.insert("scope".to_string(), json!(token.scope));
        auth.metadata.insert("username".to_string(), json!(label));
        auth.storage = Some(json!({
            "type": self.endpoints.provider,
            "access_token": token.access_token,
            "token_type": token.token_type,
            "scope": token.scope,
            "username": auth.label,
        }));
        auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_builds_credential_with_file_name_id() {
        let config = mproxy_common::ConfigPatch {
            auth_dir: Some(std::path::PathBuf::from("/tmp")),
            ..Default::default()
        }
        .into_config()
        .unwrap();
        let client = DeviceFlowClient::new(
            &config,
            DeviceFlowEndpoints {
                provider: "continue",
                client_id: "cid",
                scope: "user:email",
                device_code_url: "https://auth.example/device/code",
                token_url: "https://auth.example/oauth/token",
                user_info_url: "https://api.example/user",
            },
        )
        .unwrap();

        let auth = client.bundle(
            &TokenData {
                access_token: "at".to_string(),
                token_type: "bearer".to_string(),
                scope: "user".to_string(),
            },
            "alice".to_string(),
        );
        assert_eq!(auth.id, "continue-alice.json");
        assert_eq!(auth.label, "alice");
        assert_eq!(auth.access_token(), Some("at"));
        let storage = auth.storage.unwrap();
        assert_eq!(storage["type"], "continue");
        assert_eq!(storage["access_token"], "at");
    }
}
