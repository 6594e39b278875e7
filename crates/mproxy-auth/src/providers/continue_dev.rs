use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use mproxy_common::Config;

use crate::authenticator::{Authenticator, LoginOptions};
use crate::credential::Auth;
use crate::errors::AuthError;

use super::device_client::{DeviceFlowClient, DeviceFlowEndpoints};

const ENDPOINTS: DeviceFlowEndpoints = DeviceFlowEndpoints {
    provider: "continue",
    client_id: "continue-dev-client",
    scope: "user:email",
    device_code_url: "https://auth.continue.dev/device/code",
    token_url: "https://auth.continue.dev/oauth/token",
    user_info_url: "https://api.continue.dev/user",
};

const API_BASE_URL: &str = "https://api.continue.dev";

/// Second-stage API token returned by `/auth/token`. Short-lived; cached by
/// the executor and never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiToken {
    pub token: String,
    #[serde(default)]
    pub expires_at: i64,
}

/// Exchange the long-lived OAuth access token for an upstream API token.
pub async fn fetch_continue_api_token(
    config: &Config,
    access_token: &str,
) -> Result<ApiToken, AuthError> {
    if access_token.is_empty() {
        return Err(AuthError::TokenExchange("access token is empty".to_string()));
    }
    let base_url = config
        .provider("continue")
        .and_then(|settings| settings.base_url.as_deref())
        .unwrap_or(API_BASE_URL)
        .trim_end_matches('/');

    let mut builder = wreq::Client::builder().timeout(std::time::Duration::from_secs(30));
    if let Some(proxy) = config.proxy.as_deref() {
        builder = builder
            .proxy(wreq::Proxy::all(proxy).map_err(|err| AuthError::TokenExchange(err.to_string()))?);
    }
    let http = builder
        .build()
        .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

    let response = http
        .get(format!("{base_url}/auth/token"))
        .header("Authorization", format!("Bearer {access_token}"))
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|err| AuthError::TokenExchange(err.to_string()))?;
    if !(200..300).contains(&status) {
        return Err(AuthError::TokenExchange(format!("status {status}")));
    }
    let token: ApiToken =
        serde_json::from_slice(&body).map_err(|err| AuthError::TokenExchange(err.to_string()))?;
    if token.token.is_empty() {
        return Err(AuthError::TokenExchange("empty api token".to_string()));
    }
    Ok(token)
}

pub struct ContinueAuthenticator;

#[async_trait]
impl Authenticator for ContinueAuthenticator {
    fn provider(&self) -> &'static str {
        "continue"
    }

    // The exchange token carries the real TTL and is pre-refreshed by the
    // executor cache; the OAuth access token itself is never refreshed.

    async fn login(&self, config: &Config, opts: &LoginOptions) -> Result<Auth, AuthError> {
        let client = DeviceFlowClient::new(config, ENDPOINTS)?;
        let mut auth = client.login(opts).await?;

        // Verify access once through the second-stage exchange; the token is
        // not persisted, only its expiry hint.
        let access_token = auth.access_token().unwrap_or_default().to_string();
        let api_token = fetch_continue_api_token(config, &access_token).await?;
        if api_token.expires_at > 0 {
            auth.metadata
                .insert("api_token_expires_at".to_string(), json!(api_token.expires_at));
        }
        Ok(auth)
    }
}
