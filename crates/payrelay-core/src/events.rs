use serde::{Deserialize, Serialize};

/// Immutable payload pushed to every live connection registered under an
/// order identifier. Serialized once per delivery so each recipient gets
/// a byte-identical frame.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeliveryEvent {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub status: String,
    /// 3-D-Secure redirect URL. May be empty when the provider did not
    /// require a challenge.
    #[serde(rename = "redirectUrl")]
    pub redirect_url: String,
    /// Pass-through fields from the webhook body, delivered verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeliveryEvent {
    pub fn new(
        order_id: impl Into<String>,
        status: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status: status.into(),
            redirect_url: redirect_url.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Map<String, serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }
}
