use crate::error::TokenError;
use crate::types::Credentials;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Strict-after comparison: a token expiring exactly now is still served,
    /// to avoid a refresh storm at the boundary.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// The two response shapes spoken by token endpoints: an OAuth-style grant
/// with a TTL, or a token with an absolute expiry instant.
#[derive(Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Grant {
        access_token: String,
        expires_in: u64,
    },
    Absolute {
        token: String,
        expires_at: DateTime<Utc>,
    },
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> Token {
        match self {
            TokenResponse::Grant {
                access_token,
                expires_in,
            } => Token {
                value: access_token,
                expires_at: now + ChronoDuration::seconds(expires_in as i64),
            },
            TokenResponse::Absolute { token, expires_at } => Token {
                value: token,
                expires_at,
            },
        }
    }
}

/// Caches a bearer token for one environment, refreshing it on expiry.
///
/// All executor tasks of a run share one cache. The state lock is held across
/// the refresh await, so concurrent callers that arrive while a refresh is in
/// flight wait for it instead of issuing duplicates, and all of them observe
/// the same refreshed token. A failed refresh leaves the cached entry
/// untouched; the next call retries.
pub struct TokenCache {
    credentials: Credentials,
    token_url: String,
    client: Client,
    state: Mutex<Option<Token>>,
}

impl TokenCache {
    pub fn new(credentials: Credentials, token_url: impl Into<String>, client: Client) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            client,
            state: Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, refreshing first if the cached one has
    /// expired. No network call is made while the cached token is valid.
    pub async fn get_token(&self) -> Result<String, TokenError> {
        let mut state = self.state.lock().await;

        if let Some(token) = state.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.refresh().await?;
        tracing::debug!(token_url = %self.token_url, expires_at = %fresh.expires_at, "Refreshed bearer token");
        let value = fresh.value.clone();
        *state = Some(fresh);
        Ok(value)
    }

    async fn refresh(&self) -> Result<Token, TokenError> {
        let mut request = self
            .client
            .post(&self.token_url)
            .form(&[("grant_type", "client_credentials")]);

        request = match &self.credentials {
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::BasicAuthToken(encoded) => {
                request.header(AUTHORIZATION, format!("Basic {encoded}"))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Status(status));
        }

        let body = response.text().await?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(TokenError::Malformed)?;

        Ok(parsed.into_token(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: DateTime<Utc>) -> Token {
        Token {
            value: "abc".into(),
            expires_at,
        }
    }

    #[test]
    fn token_expiring_exactly_now_is_still_valid() {
        let now = Utc::now();
        assert!(!token(now).is_expired(now));
    }

    #[test]
    fn token_expired_in_the_past() {
        let now = Utc::now();
        assert!(token(now - ChronoDuration::seconds(1)).is_expired(now));
        assert!(!token(now + ChronoDuration::seconds(1)).is_expired(now));
    }

    #[test]
    fn grant_response_converts_ttl_to_absolute_expiry() {
        let now = Utc::now();
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"tok-1","expires_in":3600}"#).unwrap();
        let token = parsed.into_token(now);

        assert_eq!(token.value, "tok-1");
        assert_eq!(token.expires_at, now + ChronoDuration::seconds(3600));
    }

    #[test]
    fn absolute_response_keeps_expiry_instant() {
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"token":"tok-2","expires_at":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let token = parsed.into_token(Utc::now());

        assert_eq!(token.value, "tok-2");
        assert_eq!(
            token.expires_at,
            "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn unknown_response_shape_is_rejected() {
        let parsed: Result<TokenResponse, _> =
            serde_json::from_str(r#"{"access_token":"tok-3"}"#);
        assert!(parsed.is_err());
    }
}
