/// Typed error hierarchy for upstream payment-provider operations.
/// Classifies errors as fatal (don't retry), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    // Fatal — the request itself is wrong
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid transaction data: {0}")]
    InvalidRequest(String),

    // Retryable
    #[error("provider error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),

    // Operational
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. } | Self::NetworkError(_) | Self::Unavailable(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::AccessDenied(_) | Self::InvalidRequest(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::Unavailable(_) => "unavailable",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Classify an upstream HTTP status code into the appropriate variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => Self::InvalidRequest(body),
            401 => Self::AuthenticationFailed(body),
            403 => Self::AccessDenied(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::MalformedResponse(format!("unexpected status {status}: {body}")),
        }
    }

    /// HTTP status to surface to our own caller when this error bubbles
    /// out of a transaction-creation request.
    pub fn surface_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::AuthenticationFailed(_) => 401,
            Self::AccessDenied(_) => 403,
            Self::Unavailable(_) => 503,
            Self::ServerError { .. } | Self::NetworkError(_) | Self::MalformedResponse(_) => 500,
        }
    }
}
