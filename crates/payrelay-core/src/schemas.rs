//! Wire schemas for the HTTP boundary.
//!
//! Required fields are typed; everything else the merchant or provider
//! sends is carried through untouched via flattened maps, because the
//! upstream contract grows faster than we want to chase.

use serde::{Deserialize, Serialize};

use crate::events::DeliveryEvent;

/// Inbound transaction-creation request from the merchant.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub amount: f64,
    pub currency: String,
    pub lang: String,
    /// Redirect target after a successful payment.
    pub callback: String,
    pub callback_fail: String,
    pub billing: BillingDetails,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetails {
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub phone: String,
    pub email: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response returned to the merchant: the provider's payload with our
/// order identifier attached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTransactionResponse {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(flatten)]
    pub provider: serde_json::Map<String, serde_json::Value>,
}

/// Asynchronous outcome notification posted by the payment provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookNotification {
    pub id: String,
    pub status: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "3dsRedirectUrl")]
    pub redirect_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<WebhookNotification> for DeliveryEvent {
    fn from(n: WebhookNotification) -> Self {
        let mut extra = n.extra;
        extra.insert("id".into(), serde_json::Value::String(n.id));
        DeliveryEvent::new(n.order_id, n.status, n.redirect_url).with_extra(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_requires_billing() {
        let json = r#"{"amount":10.0,"currency":"USD","lang":"en","callback":"https://m/ok","callbackFail":"https://m/fail"}"#;
        let parsed: Result<CreateTransactionRequest, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn create_request_carries_unknown_fields() {
        let json = r#"{
            "amount": 10.0,
            "currency": "USD",
            "lang": "en",
            "callback": "https://m/ok",
            "callbackFail": "https://m/fail",
            "billing": {
                "firstName": "Ada", "lastName": "Lovelace",
                "address1": "1 Analytical Way", "city": "London",
                "state": "LDN", "country": "GB", "postalCode": "E1",
                "phone": "+44", "email": "ada@example.com"
            },
            "saveCard": true,
            "payment3dsType": "Redirection"
        }"#;
        let parsed: CreateTransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.currency, "USD");
        assert_eq!(parsed.extra["saveCard"], true);
        assert_eq!(parsed.extra["payment3dsType"], "Redirection");
    }

    #[test]
    fn webhook_requires_order_id_and_redirect_url() {
        let json = r#"{"id":"pay_1","status":"pending"}"#;
        let parsed: Result<WebhookNotification, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn webhook_to_delivery_event() {
        let json = r#"{
            "id": "pay_1",
            "status": "approved",
            "orderId": "ord_42",
            "3dsRedirectUrl": "https://acs.example/challenge",
            "cardMask": "411111******1111"
        }"#;
        let notification: WebhookNotification = serde_json::from_str(json).unwrap();
        let event: DeliveryEvent = notification.into();
        assert_eq!(event.order_id, "ord_42");
        assert_eq!(event.redirect_url, "https://acs.example/challenge");
        // the provider's payment id rides along as a pass-through field
        assert_eq!(event.extra["id"], "pay_1");
        assert_eq!(event.extra["cardMask"], "411111******1111");
    }

    #[test]
    fn response_merges_provider_fields() {
        let mut provider = serde_json::Map::new();
        provider.insert("paymentId".into(), "pay_77".into());
        provider.insert("paymentUrl".into(), "https://pay.example/77".into());

        let resp = CreateTransactionResponse {
            order_id: "ord_77".into(),
            provider,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["orderId"], "ord_77");
        assert_eq!(value["paymentId"], "pay_77");
        assert_eq!(value["paymentUrl"], "https://pay.example/77");
    }
}
