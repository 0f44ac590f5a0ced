use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PlatformError;
use crate::providers::{CreatedPayment, PaymentProvider, ProviderResult};

const SANDBOX_API_BASE: &str = "https://api.sandbox.paypal.com";
const LIVE_API_BASE: &str = "https://api.paypal.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaypalCredential {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    webhook_id: Option<String>,
    #[serde(default)]
    api_base: Option<String>,
}

struct PaypalConfig {
    client_id: String,
    client_secret: String,
    webhook_id: Option<String>,
    api_base: String,
}

/// Approval-redirect style adapter: order creation returns an `approve` link
/// the payer must visit, and webhook signatures are verified through the
/// vendor's own verification endpoint.
pub struct PaypalProvider {
    http: reqwest::Client,
    config: Option<PaypalConfig>,
}

impl PaypalProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, config: None }
    }

    fn config(&self) -> ProviderResult<&PaypalConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| PlatformError::validation("paypal adapter used before init"))
    }

    fn vendor_err(message: impl std::fmt::Display) -> PlatformError {
        PlatformError::vendor("paypal", message)
    }

    async fn access_token(&self) -> ProviderResult<String> {
        let cfg = self.config()?;
        let resp = self
            .http
            .post(format!("{}/v1/oauth2/token", cfg.api_base))
            .basic_auth(&cfg.client_id, Some(&cfg.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Self::vendor_err("could not obtain access token"))
    }
}

fn approve_link(body: &Value) -> Option<String> {
    body["links"]
        .as_array()?
        .iter()
        .find(|link| link["rel"].as_str() == Some("approve"))
        .and_then(|link| link["href"].as_str())
        .map(str::to_string)
}

#[async_trait]
impl PaymentProvider for PaypalProvider {
    fn init(&mut self, credential: &Value) -> ProviderResult<()> {
        let cred: PaypalCredential = serde_json::from_value(credential.clone()).map_err(|_| {
            PlatformError::validation("paypal credential requires clientId and clientSecret")
        })?;
        if cred.client_id.is_empty() || cred.client_secret.is_empty() {
            return Err(PlatformError::validation(
                "paypal credential requires clientId and clientSecret",
            ));
        }
        let environment = cred.environment.as_deref().unwrap_or("sandbox");
        let api_base = cred.api_base.unwrap_or_else(|| {
            if environment == "production" { LIVE_API_BASE } else { SANDBOX_API_BASE }.to_string()
        });
        self.config = Some(PaypalConfig {
            client_id: cred.client_id,
            client_secret: cred.client_secret,
            webhook_id: cred.webhook_id,
            api_base,
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
        let (Some(return_url), Some(cancel_url)) =
            (metadata["returnUrl"].as_str(), metadata["cancelUrl"].as_str())
        else {
            return Err(PlatformError::validation(
                "returnUrl and cancelUrl are required for paypal payments",
            ));
        };

        let token = self.access_token().await?;
        let order = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": currency,
                    "value": amount.to_string(),
                },
                "description": metadata["description"].as_str().unwrap_or("Payment for goods/services"),
            }],
            "application_context": {
                "brand_name": metadata["brandName"].as_str().unwrap_or("TabHQ"),
                "landing_page": "NO_PREFERENCE",
                "user_action": "PAY_NOW",
                "return_url": return_url,
                "cancel_url": cancel_url,
            },
        });
        let resp = self
            .http
            .post(format!("{}/v2/checkout/orders", cfg.api_base))
            .bearer_auth(&token)
            .json(&order)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let status = resp.status();
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if !status.is_success() {
            let message = body["message"].as_str().unwrap_or("order creation failed");
            return Err(Self::vendor_err(message));
        }

        let provider_ref = body["id"]
            .as_str()
            .ok_or_else(|| Self::vendor_err("order response missing id"))?
            .to_string();
        Ok(CreatedPayment {
            provider_ref,
            vendor_status: body["status"].as_str().unwrap_or("pending").to_string(),
            redirect_url: approve_link(&body),
        })
    }

    async fn capture_payment(&self, provider_ref: &str) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/v2/checkout/orders/{provider_ref}/capture", cfg.api_base))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        Ok(body["status"].as_str() == Some("COMPLETED"))
    }

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Option<&BigDecimal>,
    ) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let token = self.access_token().await?;
        let mut payload = json!({ "note_to_payer": "Refund" });
        if let Some(amount) = amount {
            payload["amount"] = json!({
                "value": amount.to_string(),
                "currency_code": "USD",
            });
        }
        let resp = self
            .http
            .post(format!("{}/v2/payments/captures/{provider_ref}/refund", cfg.api_base))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        Ok(body["status"].as_str() == Some("COMPLETED"))
    }

    async fn verify_webhook_signature(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
        _secret: &str,
    ) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let Some(webhook_id) = cfg.webhook_id.as_deref() else {
            return Err(PlatformError::validation(
                "webhookId is required for paypal signature verification",
            ));
        };
        let event: Value = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(_) => return Ok(false),
        };
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
        };
        let verification = json!({
            "auth_algo": header("paypal-auth-algo"),
            "cert_url": header("paypal-cert-url"),
            "transmission_id": header("paypal-transmission-id"),
            "transmission_sig": header("paypal-transmission-sig"),
            "transmission_time": header("paypal-transmission-time"),
            "webhook_id": webhook_id,
            "webhook_event": event,
        });
        let resp = self
            .http
            .post(format!("{}/v1/notifications/verify-webhook-signature", cfg.api_base))
            .basic_auth(&cfg.client_id, Some(&cfg.client_secret))
            .json(&verification)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        Ok(body["verification_status"].as_str() == Some("SUCCESS"))
    }

    async fn verify_transaction_by_reference(&self, tx_ref: &str) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(format!("{}/v2/checkout/orders/{tx_ref}", cfg.api_base))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        Ok(body["status"].as_str() == Some("COMPLETED"))
    }
}
