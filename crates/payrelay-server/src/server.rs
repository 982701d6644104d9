use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use payrelay_delivery::{ConnectionRegistry, DeliveryEngine};
use payrelay_provider::PaymentProvider;
use tower_http::cors::CorsLayer;

use crate::gateway;
use crate::routes;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Public base URL the provider posts webhooks back to.
    pub webhook_base_url: String,
    /// Per-connection bounded send queue depth.
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    /// A peer that answers no ping within this window is swept.
    pub client_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            webhook_base_url: "http://localhost:3000".to_owned(),
            max_send_queue: 64,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub engine: Arc<DeliveryEngine>,
    pub provider: Arc<dyn PaymentProvider>,
    pub config: Arc<ServerConfig>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(gateway::ws_handler))
        .route("/transaction", post(routes::create_transaction))
        .route("/webhook", post(routes::webhook))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps background
/// tasks alive.
pub async fn start(
    config: ServerConfig,
    engine: Arc<DeliveryEngine>,
    provider: Arc<dyn PaymentProvider>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::clone(engine.registry());

    let sweep_handle = gateway::start_sweep_task(
        Arc::clone(&registry),
        config.sweep_interval,
        config.client_timeout,
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        registry,
        engine,
        provider,
        config: Arc::new(config),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "payrelay server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _sweep: sweep_handle,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _sweep: tokio::task::JoinHandle<()>,
}

/// Health check HTTP endpoint with registry diagnostics.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.total(),
        "groups": state.registry.group_count(),
        "deliveryRetries": state.engine.total_retries(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrelay_delivery::{Connection, RetryPolicy};
    use payrelay_provider::MockPaymentProvider;

    fn test_engine() -> Arc<DeliveryEngine> {
        let registry = Arc::new(ConnectionRegistry::new());
        Arc::new(DeliveryEngine::new(
            registry,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                factor: 2.0,
            },
        ))
    }

    fn test_state(engine: Arc<DeliveryEngine>) -> AppState {
        AppState {
            registry: Arc::clone(engine.registry()),
            engine,
            provider: Arc::new(MockPaymentProvider::always(
                serde_json::json!({"paymentId": "pay_1"}),
            )),
            config: Arc::new(ServerConfig::default()),
        }
    }

    #[test]
    fn build_router_creates_routes() {
        let _router = build_router(test_state(test_engine()));
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let engine = test_engine();
        let provider = Arc::new(MockPaymentProvider::always(serde_json::json!({})));

        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };

        let handle = start(config, engine, provider).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn health_reports_live_connections() {
        let engine = test_engine();
        let registry = Arc::clone(engine.registry());
        let provider = Arc::new(MockPaymentProvider::always(serde_json::json!({})));

        let handle = start(
            ServerConfig { port: 0, ..Default::default() },
            engine,
            provider,
        )
        .await
        .unwrap();

        let (conn, _rx) = Connection::channel(4);
        registry.register("ord_1", conn);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["connections"], 1);
        assert_eq!(body["groups"], 1);
    }
}
