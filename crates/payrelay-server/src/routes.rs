//! Transaction-creation and webhook-ingress routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use payrelay_core::errors::ProviderError;
use payrelay_core::events::DeliveryEvent;
use payrelay_core::ids::OrderId;
use payrelay_core::schemas::{
    CreateTransactionRequest, CreateTransactionResponse, WebhookNotification,
};

use crate::server::AppState;

/// `POST /transaction` — forward a transaction to the payment provider
/// under a freshly issued order identifier.
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> Response {
    let order_id = OrderId::new();
    let hook_url = format!(
        "{}/webhook",
        state.config.webhook_base_url.trim_end_matches('/')
    );

    let mut body = match serde_json::to_value(&request) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "failed to re-serialize transaction request");
            return provider_error_response(&ProviderError::MalformedResponse(e.to_string()));
        }
    };
    body["orderId"] = serde_json::Value::String(order_id.to_string());
    body["hookUrl"] = serde_json::Value::String(hook_url);

    match state.provider.create_transaction(&body).await {
        Ok(serde_json::Value::Object(provider)) => {
            tracing::info!(order_id = %order_id, "transaction created");
            (
                StatusCode::OK,
                Json(CreateTransactionResponse {
                    order_id: order_id.to_string(),
                    provider,
                }),
            )
                .into_response()
        }
        Ok(other) => {
            tracing::error!(order_id = %order_id, body = %other, "provider returned a non-object response");
            provider_error_response(&ProviderError::MalformedResponse(
                "non-object provider response".into(),
            ))
        }
        Err(e) => {
            tracing::error!(
                order_id = %order_id,
                error = %e,
                error_kind = e.error_kind(),
                "error creating transaction"
            );
            provider_error_response(&e)
        }
    }
}

/// Map a provider error onto our own HTTP surface.
fn provider_error_response(error: &ProviderError) -> Response {
    let status =
        StatusCode::from_u16(error.surface_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match error.surface_status() {
        400 => "Invalid transaction data",
        401 => "Unauthorized: Invalid credentials",
        403 => "Forbidden: Access denied",
        503 => "Service unavailable, please try again later",
        _ => "Failed to create transaction",
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// `POST /webhook` — accept the provider's asynchronous outcome and hand
/// it to the delivery engine exactly once, as a fire-and-forget task.
/// The provider gets its acknowledgement immediately; the retry loop can
/// outlive this request by minutes.
pub async fn webhook(
    State(state): State<AppState>,
    Json(notification): Json<WebhookNotification>,
) -> impl IntoResponse {
    tracing::info!(
        order_id = %notification.order_id,
        status = %notification.status,
        listeners = state.registry.count(&notification.order_id),
        "webhook received"
    );

    let key = notification.order_id.clone();
    let event: DeliveryEvent = notification.into();
    let engine = Arc::clone(&state.engine);

    tokio::spawn(async move {
        let outcome = engine.deliver(&key, &event).await;
        match outcome {
            payrelay_delivery::DeliveryOutcome::Delivered => {
                tracing::info!(order_id = %key, "webhook outcome delivered");
            }
            other => {
                tracing::warn!(
                    order_id = %key,
                    outcome = other.as_str(),
                    "webhook outcome not delivered"
                );
            }
        }
    });

    Json(serde_json::json!({ "status": "ok" }))
}
