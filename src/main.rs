use std::sync::Arc;
use std::time::Duration;

use payrelay_delivery::{ConnectionRegistry, DeliveryEngine, RetryPolicy};
use payrelay_provider::{HttpPaymentProvider, ProviderConfig};
use payrelay_server::ServerConfig;
use payrelay_telemetry::{init_telemetry, TelemetryConfig};
use secrecy::SecretString;

#[tokio::main]
async fn main() {
    init_telemetry(TelemetryConfig::default());

    tracing::info!("starting payrelay server");

    let server_config = ServerConfig {
        port: env_or("PORT", 3000),
        webhook_base_url: std::env::var("WEBHOOK_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_owned()),
        ..Default::default()
    };

    let mut provider_config = ProviderConfig {
        client_id: std::env::var("PROVIDER_CLIENT_ID").unwrap_or_default(),
        client_secret: SecretString::from(
            std::env::var("PROVIDER_CLIENT_SECRET").unwrap_or_default(),
        ),
        ..Default::default()
    };
    if let Ok(url) = std::env::var("PROVIDER_TOKEN_URL") {
        provider_config.token_url = url;
    }
    if let Ok(url) = std::env::var("PROVIDER_API_URL") {
        provider_config.api_url = url;
    }

    let policy = RetryPolicy {
        max_attempts: env_or("DELIVERY_MAX_ATTEMPTS", 5),
        base_delay: Duration::from_millis(env_or("DELIVERY_BASE_DELAY_MS", 2000)),
        factor: 2.0,
    };

    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(DeliveryEngine::new(registry, policy));
    let provider = Arc::new(HttpPaymentProvider::new(provider_config));

    let port = server_config.port;
    let _handle = payrelay_server::start(server_config, engine, provider)
        .await
        .expect("failed to start server");

    tracing::info!(port, "payrelay server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");

    tracing::info!("shutting down");
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
