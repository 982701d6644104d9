pub mod client;
pub mod token;

pub use client::{HttpPaymentProvider, MockPaymentProvider, PaymentProvider};
pub use token::TokenClient;

use std::time::Duration;

use secrecy::SecretString;

const DEFAULT_TOKEN_URL: &str =
    "https://sso.omno.com/realms/omno/protocol/openid-connect/token";
const DEFAULT_API_URL: &str = "https://api.omno.com/transaction/h2h/create";

/// Upstream endpoints and credentials for the payment provider.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// OAuth token endpoint (client-credentials grant).
    pub token_url: String,
    /// Host-to-host transaction-creation endpoint.
    pub api_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub connect_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_owned(),
            api_url: DEFAULT_API_URL.to_owned(),
            client_id: String::new(),
            client_secret: SecretString::from(String::new()),
            connect_timeout: Duration::from_secs(30),
        }
    }
}
