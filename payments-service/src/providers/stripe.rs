use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::error::PlatformError;
use crate::providers::{CreatedPayment, PaymentProvider, ProviderResult};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StripeCredential {
    secret_key: String,
    #[serde(default)]
    api_base: Option<String>,
}

struct StripeConfig {
    secret_key: String,
    api_base: String,
}

/// Card-intent style adapter: amounts are charged in minor units and the
/// webhook scheme is an HMAC over `<timestamp>.<raw body>` carried in the
/// `Stripe-Signature` header.
pub struct StripeProvider {
    http: reqwest::Client,
    config: Option<StripeConfig>,
}

impl StripeProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, config: None }
    }

    fn config(&self) -> ProviderResult<&StripeConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| PlatformError::validation("stripe adapter used before init"))
    }

    fn vendor_err(message: impl std::fmt::Display) -> PlatformError {
        PlatformError::vendor("stripe", message)
    }
}

/// Flatten a metadata object into `metadata[key]` form fields. Non-string
/// scalars are rendered with their JSON representation.
fn metadata_form_fields(metadata: &Value) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    if let Value::Object(map) = metadata {
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.push((format!("metadata[{key}]"), rendered));
        }
    }
    fields
}

/// Verify a `t=<ts>,v1=<hex>` signature header: v1 must equal
/// HMAC-SHA256(secret, "<ts>.<payload>"), compared in constant time.
fn verify_signature_header(header: &str, payload: &[u8], secret: &str) -> bool {
    let mut timestamp = None;
    let mut provided = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => provided = Some(value),
            _ => {}
        }
    }
    let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
        return false;
    };
    let mut mac = match <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    common_crypto::constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn init(&mut self, credential: &Value) -> ProviderResult<()> {
        let cred: StripeCredential = serde_json::from_value(credential.clone())
            .map_err(|_| PlatformError::validation("stripe credential requires secretKey"))?;
        if cred.secret_key.is_empty() {
            return Err(PlatformError::validation("stripe credential requires secretKey"));
        }
        self.config = Some(StripeConfig {
            secret_key: cred.secret_key,
            api_base: cred.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        });
        Ok(())
    }

    async fn create_payment(
        &self,
        amount: &BigDecimal,
        currency: &str,
        metadata: &Value,
    ) -> ProviderResult<CreatedPayment> {
        let cfg = self.config()?;
        let minor = common_money::to_minor_units(amount)
            .ok_or_else(|| PlatformError::validation("amount out of range"))?;
        let mut form = vec![
            ("amount".to_string(), minor.to_string()),
            ("currency".to_string(), currency.to_ascii_lowercase()),
        ];
        form.extend(metadata_form_fields(metadata));

        let resp = self
            .http
            .post(format!("{}/v1/payment_intents", cfg.api_base))
            .bearer_auth(&cfg.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let status = resp.status();
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("payment intent creation failed");
            return Err(Self::vendor_err(message));
        }

        let provider_ref = body["id"]
            .as_str()
            .ok_or_else(|| Self::vendor_err("payment intent response missing id"))?
            .to_string();
        Ok(CreatedPayment {
            provider_ref,
            vendor_status: body["status"].as_str().unwrap_or("pending").to_string(),
            redirect_url: None,
        })
    }

    async fn capture_payment(&self, provider_ref: &str) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let resp = self
            .http
            .post(format!("{}/v1/payment_intents/{provider_ref}/capture", cfg.api_base))
            .bearer_auth(&cfg.secret_key)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        Ok(body["status"].as_str() == Some("succeeded"))
    }

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Option<&BigDecimal>,
    ) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let mut form = vec![("payment_intent".to_string(), provider_ref.to_string())];
        if let Some(amount) = amount {
            let minor = common_money::to_minor_units(amount)
                .ok_or_else(|| PlatformError::validation("refund amount out of range"))?;
            form.push(("amount".to_string(), minor.to_string()));
        }
        let resp = self
            .http
            .post(format!("{}/v1/refunds", cfg.api_base))
            .bearer_auth(&cfg.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let status = resp.status();
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("refund failed");
            return Err(Self::vendor_err(message));
        }
        Ok(body["status"].as_str() == Some("succeeded"))
    }

    async fn verify_webhook_signature(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
        secret: &str,
    ) -> ProviderResult<bool> {
        let Some(header) = headers.get("stripe-signature").and_then(|v| v.to_str().ok()) else {
            return Ok(false);
        };
        Ok(verify_signature_header(header, payload, secret))
    }

    async fn verify_transaction_by_reference(&self, tx_ref: &str) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let resp = self
            .http
            .get(format!("{}/v1/payment_intents/{tx_ref}", cfg.api_base))
            .bearer_auth(&cfg.secret_key)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        Ok(body["status"].as_str() == Some("succeeded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn init_requires_secret_key() {
        let mut adapter = StripeProvider::new(reqwest::Client::new());
        assert!(adapter.init(&json!({"publicKey": "pk_test"})).is_err());
        assert!(adapter.init(&json!({"secretKey": ""})).is_err());
        assert!(adapter.init(&json!({"secretKey": "sk_test"})).is_ok());
        // Idempotent re-init.
        assert!(adapter.init(&json!({"secretKey": "sk_test"})).is_ok());
    }

    #[test]
    fn signature_header_round_trip() {
        let payload = br#"{"data":{"object":{"id":"pi_1"}}}"#;
        let header = sign("whsec_test", "1712000000", payload);
        assert!(verify_signature_header(&header, payload, "whsec_test"));
        assert!(!verify_signature_header(&header, payload, "whsec_other"));
        assert!(!verify_signature_header(&header, b"tampered", "whsec_test"));
    }

    #[test]
    fn signature_header_requires_both_fields() {
        assert!(!verify_signature_header("t=123", b"{}", "whsec_test"));
        assert!(!verify_signature_header("v1=abc", b"{}", "whsec_test"));
        assert!(!verify_signature_header("", b"{}", "whsec_test"));
    }

    #[test]
    fn metadata_flattens_to_form_fields() {
        let fields = metadata_form_fields(&json!({"orderId": "ord-1", "attempt": 2}));
        assert!(fields.contains(&("metadata[orderId]".to_string(), "ord-1".to_string())));
        assert!(fields.contains(&("metadata[attempt]".to_string(), "2".to_string())));
        assert!(metadata_form_fields(&Value::Null).is_empty());
    }
}
