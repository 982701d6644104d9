use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use payrelay_core::errors::ProviderError;
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::token::{map_transport_error, TokenClient};
use crate::ProviderConfig;

/// Outbound seam to the payment provider. The HTTP implementation is
/// swapped for a mock in route tests.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Forward a fully-assembled transaction body to the provider's
    /// create endpoint and return its JSON response.
    async fn create_transaction(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;
}

/// reqwest-backed provider client with bearer-token acquisition.
pub struct HttpPaymentProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    tokens: TokenClient,
}

impl HttpPaymentProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .expect("failed to build HTTP client");
        let tokens = TokenClient::new(http.clone(), config.clone());
        Self { http, config, tokens }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip_all)]
    async fn create_transaction(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let bearer = self.tokens.bearer().await?;

        let response = self
            .http
            .post(&self.config.api_url)
            .header(
                "authorization",
                format!("Bearer {}", bearer.expose_secret()),
            )
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

/// Pre-programmed provider responses for deterministic testing without
/// upstream calls.
pub struct MockPaymentProvider {
    responses: parking_lot::Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
    call_count: AtomicUsize,
}

impl MockPaymentProvider {
    pub fn new(responses: Vec<Result<serde_json::Value, ProviderError>>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses.into()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Convenience: a mock that always answers with the given payload.
    pub fn always(payload: serde_json::Value) -> Self {
        Self::new(vec![Ok(payload)])
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_transaction(
        &self,
        _body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let mut responses = self.responses.lock();
        match responses.pop_front() {
            Some(response) => {
                // `always` mode: keep replaying the last response.
                if responses.is_empty() {
                    if let Ok(payload) = &response {
                        responses.push_back(Ok(payload.clone()));
                    }
                }
                response
            }
            None => Err(ProviderError::Unavailable("mock responses exhausted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_replays_responses_in_order() {
        let mock = MockPaymentProvider::new(vec![
            Ok(serde_json::json!({"paymentId": "pay_1"})),
            Err(ProviderError::InvalidRequest("bad amount".into())),
        ]);

        let first = mock.create_transaction(&serde_json::json!({})).await.unwrap();
        assert_eq!(first["paymentId"], "pay_1");

        let second = mock.create_transaction(&serde_json::json!({})).await;
        assert!(matches!(second, Err(ProviderError::InvalidRequest(_))));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn mock_always_keeps_answering() {
        let mock = MockPaymentProvider::always(serde_json::json!({"paymentUrl": "https://pay"}));
        for _ in 0..3 {
            let resp = mock.create_transaction(&serde_json::json!({})).await.unwrap();
            assert_eq!(resp["paymentUrl"], "https://pay");
        }
    }

    #[tokio::test]
    async fn unreachable_provider_maps_to_unavailable() {
        let provider = HttpPaymentProvider::new(ProviderConfig {
            token_url: "http://127.0.0.1:1/token".into(),
            api_url: "http://127.0.0.1:1/create".into(),
            ..Default::default()
        });

        let err = provider
            .create_transaction(&serde_json::json!({"amount": 1}))
            .await
            .expect_err("expected transport error");
        assert_eq!(err.surface_status(), 503);
    }
}
