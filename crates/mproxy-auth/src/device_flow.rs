use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use crate::errors::AuthError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_POLL_DURATION: Duration = Duration::from_secs(15 * 60);
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// RFC 8628 device authorization response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

/// One token-endpoint poll result, already classified from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Token(TokenData),
    Pending,
    SlowDown,
    Expired,
    Denied,
    OAuth { code: String, description: String },
}

impl PollOutcome {
    /// Classify a token-endpoint response body per the device-flow grammar.
    pub fn from_wire(body: &[u8]) -> Result<PollOutcome, AuthError> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            error: String,
            #[serde(default)]
            error_description: String,
            #[serde(default)]
            access_token: String,
            #[serde(default)]
            token_type: String,
            #[serde(default)]
            scope: String,
        }
        let wire: Wire = serde_json::from_slice(body)
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

        if !wire.error.is_empty() {
            return Ok(match wire.error.as_str() {
                "authorization_pending" => PollOutcome::Pending,
                "slow_down" => PollOutcome::SlowDown,
                "expired_token" => PollOutcome::Expired,
                "access_denied" => PollOutcome::Denied,
                _ => PollOutcome::OAuth {
                    code: wire.error,
                    description: wire.error_description,
                },
            });
        }
        if wire.access_token.is_empty() {
            return Err(AuthError::TokenExchange("empty access token".to_string()));
        }
        Ok(PollOutcome::Token(TokenData {
            access_token: wire.access_token,
            token_type: wire.token_type,
            scope: wire.scope,
        }))
    }
}

/// Poll the token endpoint until the flow resolves.
///
/// The endpoint call is abstracted so the timing behavior is testable: the
/// interval never drops below five seconds, `slow_down` widens it by five,
/// and the total wait is bounded by `min(expires_in, 15 min)`. The deadline
/// is checked when a tick fires, so a timeout lands within one interval past
/// the bound, never before it.
pub async fn poll_for_token<F, Fut>(
    device_code: &DeviceCode,
    mut exchange: F,
) -> Result<TokenData, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome, AuthError>>,
{
    let mut interval = Duration::from_secs(device_code.interval).max(DEFAULT_POLL_INTERVAL);

    let mut deadline = Instant::now() + MAX_POLL_DURATION;
    if device_code.expires_in > 0 {
        let code_deadline = Instant::now() + Duration::from_secs(device_code.expires_in);
        if code_deadline < deadline {
            deadline = code_deadline;
        }
    }

    loop {
        tokio::time::sleep(interval).await;
        if Instant::now() > deadline {
            return Err(AuthError::PollingTimeout);
        }

        match exchange().await? {
            PollOutcome::Token(token) => return Ok(token),
            PollOutcome::Pending => {}
            PollOutcome::SlowDown => interval += SLOW_DOWN_STEP,
            PollOutcome::Expired => return Err(AuthError::DeviceCodeExpired),
            PollOutcome::Denied => return Err(AuthError::AccessDenied),
            PollOutcome::OAuth { code, description } => {
                return Err(AuthError::OAuth { code, description });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn device_code(expires_in: u64, interval: u64) -> DeviceCode {
        DeviceCode {
            device_code: "dc".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            verification_uri: "https://x/activate".to_string(),
            expires_in,
            interval,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_two_pending_polls() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls_ref = calls.clone();
        let token = poll_for_token(&device_code(600, 5), move || {
            let calls = calls_ref.clone();
            async move {
                let mut n = calls.lock().unwrap();
                *n += 1;
                Ok(if *n < 3 {
                    PollOutcome::Pending
                } else {
                    PollOutcome::Token(TokenData {
                        access_token: "at".to_string(),
                        token_type: "bearer".to_string(),
                        scope: "user".to_string(),
                    })
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_forever_times_out_at_expiry_bound() {
        let started = Instant::now();
        let err = poll_for_token(&device_code(600, 5), || async {
            Ok(PollOutcome::Pending)
        })
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::PollingTimeout);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(600), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(605), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_capped_at_fifteen_minutes() {
        let started = Instant::now();
        let err = poll_for_token(&device_code(3_600, 5), || async {
            Ok(PollOutcome::Pending)
        })
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::PollingTimeout);
        let elapsed = started.elapsed();
        assert!(elapsed >= MAX_POLL_DURATION);
        assert!(elapsed <= MAX_POLL_DURATION + Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_widens_the_interval() {
        let polls = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let polls_ref = polls.clone();
        let calls = Arc::new(Mutex::new(0u32));
        let calls_ref = calls.clone();

        poll_for_token(&device_code(600, 5), move || {
            let polls = polls_ref.clone();
            let calls = calls_ref.clone();
            async move {
                polls.lock().unwrap().push(Instant::now());
                let mut n = calls.lock().unwrap();
                *n += 1;
                Ok(match *n {
                    1 => PollOutcome::SlowDown,
                    2 => PollOutcome::Pending,
                    _ => PollOutcome::Denied,
                })
            }
        })
        .await
        .unwrap_err();

        let polls = polls.lock().unwrap();
        assert_eq!(polls.len(), 3);
        assert_eq!(polls[1] - polls[0], Duration::from_secs(10));
        assert_eq!(polls[2] - polls[1], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_outcomes_stop_immediately() {
        let err = poll_for_token(&device_code(600, 1), || async {
            Ok(PollOutcome::Expired)
        })
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::DeviceCodeExpired);

        let err = poll_for_token(&device_code(600, 1), || async {
            Ok(PollOutcome::Denied)
        })
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::AccessDenied);
    }

    #[test]
    fn wire_classification_matches_grammar() {
        assert_eq!(
            PollOutcome::from_wire(br#"{"error":"authorization_pending"}"#).unwrap(),
            PollOutcome::Pending
        );
        assert_eq!(
            PollOutcome::from_wire(br#"{"error":"slow_down"}"#).unwrap(),
            PollOutcome::SlowDown
        );
        assert_eq!(
            PollOutcome::from_wire(br#"{"error":"expired_token"}"#).unwrap(),
            PollOutcome::Expired
        );
        let token = PollOutcome::from_wire(
            br#"{"access_token":"at","token_type":"bearer","scope":"user"}"#,
        )
        .unwrap();
        assert!(matches!(token, PollOutcome::Token(t) if t.access_token == "at"));
        assert!(PollOutcome::from_wire(br#"{"access_token":""}"#).is_err());
    }
}
