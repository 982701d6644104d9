use chrono::Utc;
use payrelay_core::errors::ProviderError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ProviderConfig;

/// Re-acquire a token this long before its stated expiry.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Token endpoint response (client-credentials grant).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    access_token: SecretString,
    /// Epoch milliseconds.
    expires_at: i64,
}

/// Check if a token is expired or within the refresh buffer.
fn needs_refresh(expires_at: i64) -> bool {
    expires_at - Utc::now().timestamp_millis() < TOKEN_EXPIRY_BUFFER_SECS * 1000
}

/// Acquires and caches bearer tokens from the authorization server.
pub struct TokenClient {
    http: reqwest::Client,
    config: ProviderConfig,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            http,
            config,
            cached: RwLock::new(None),
        }
    }

    /// Current bearer token, fetched from the authorization server if
    /// the cached one is absent or near expiry.
    pub async fn bearer(&self) -> Result<SecretString, ProviderError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if !needs_refresh(token.expires_at) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.fetch().await?;
        let access_token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(access_token)
    }

    async fn fetch(&self) -> Result<CachedToken, ProviderError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        debug!(expires_in = token.expires_in, "access token acquired");
        Ok(CachedToken {
            access_token: SecretString::from(token.access_token),
            expires_at: Utc::now().timestamp_millis() + token.expires_in as i64 * 1000,
        })
    }

    #[cfg(test)]
    async fn seed_cache(&self, token: &str, expires_at: i64) {
        *self.cached.write().await = Some(CachedToken {
            access_token: SecretString::from(token.to_owned()),
            expires_at,
        });
    }
}

/// Classify reqwest transport failures the way the gateway surfaces
/// them: refused/timed-out upstreams are 503-worthy, the rest are
/// plain network errors.
pub(crate) fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() {
        ProviderError::Unavailable(e.to_string())
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_url(token_url: &str) -> TokenClient {
        let config = ProviderConfig {
            token_url: token_url.to_owned(),
            client_id: "merchant".into(),
            client_secret: SecretString::from("s3cret".to_owned()),
            ..Default::default()
        };
        TokenClient::new(reqwest::Client::new(), config)
    }

    #[test]
    fn fresh_token_does_not_need_refresh() {
        let expires_at = Utc::now().timestamp_millis() + 300_000;
        assert!(!needs_refresh(expires_at));
    }

    #[test]
    fn expired_token_needs_refresh() {
        let expires_at = Utc::now().timestamp_millis() - 1;
        assert!(needs_refresh(expires_at));
    }

    #[test]
    fn token_within_buffer_needs_refresh() {
        // Expires in 30s — inside the 60s buffer.
        let expires_at = Utc::now().timestamp_millis() + 30_000;
        assert!(needs_refresh(expires_at));
    }

    #[tokio::test]
    async fn cached_unexpired_token_is_reused_without_network() {
        // The token URL is unroutable; reaching for the network would
        // error, so an Ok proves the cache satisfied the call.
        let client = client_with_url("http://127.0.0.1:1/token");
        client
            .seed_cache("tok_cached", Utc::now().timestamp_millis() + 300_000)
            .await;

        let bearer = client.bearer().await.unwrap();
        assert_eq!(bearer.expose_secret(), "tok_cached");
    }

    #[tokio::test]
    async fn expired_cached_token_triggers_reacquisition() {
        let client = client_with_url("http://127.0.0.1:1/token");
        client
            .seed_cache("tok_stale", Utc::now().timestamp_millis() - 1000)
            .await;

        let err = client.bearer().await.expect_err("expected transport error");
        assert!(err.is_retryable(), "got: {err:?}");
    }

    #[test]
    fn token_response_parses_with_and_without_expiry() {
        let full: TokenResponse =
            serde_json::from_str(r#"{"access_token":"tok","expires_in":300,"token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(full.access_token, "tok");
        assert_eq!(full.expires_in, 300);

        let minimal: TokenResponse = serde_json::from_str(r#"{"access_token":"tok"}"#).unwrap();
        assert_eq!(minimal.expires_in, 0);
    }
}
