use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::PlatformError;
use crate::providers::{CreatedPayment, PaymentProvider, ProviderResult};

const DEFAULT_API_BASE: &str = "https://api.flutterwave.com/v3";
const DEFAULT_COUNTRY: &str = "ghana";

/// Charge families the mobile-money API accepts directly.
const MOBILE_MONEY_FAMILIES: &[&str] = &[
    "ghana",
    "uganda",
    "rwanda",
    "zambia",
    "tanzania",
    "franco_phone",
    "mpesa",
];

/// ISO codes routed through the francophone charge family.
const FRANCOPHONE_COUNTRIES: &[(&str, &str)] = &[
    ("CM", "cameroon"),
    ("CI", "cote_divoire"),
    ("SN", "senegal"),
    ("ML", "mali"),
    ("TG", "togo"),
    ("BF", "burkina_faso"),
    ("BJ", "benin"),
    ("GN", "guinea"),
    ("CD", "democratic_republic_congo"),
    ("FR", "france"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlutterwaveCredential {
    public_key: String,
    secret_key: String,
    #[serde(default)]
    default_country: Option<String>,
    #[serde(default)]
    api_base: Option<String>,
}

struct FlutterwaveConfig {
    secret_key: String,
    default_country: String,
    api_base: String,
}

#[derive(Debug, PartialEq)]
struct ResolvedCountry {
    /// Charge family the vendor API is called with.
    family: String,
    /// Country as supplied by the tenant, preserved for francophone charges.
    original: String,
}

fn resolve_country(input: &str) -> ResolvedCountry {
    let upper = input.to_ascii_uppercase();
    if FRANCOPHONE_COUNTRIES.iter().any(|(iso, _)| *iso == upper) {
        return ResolvedCountry { family: "franco_phone".to_string(), original: upper };
    }
    ResolvedCountry {
        family: input.to_ascii_lowercase(),
        original: input.to_string(),
    }
}

fn supported_variants() -> String {
    MOBILE_MONEY_FAMILIES
        .iter()
        .copied()
        .chain(FRANCOPHONE_COUNTRIES.iter().map(|(iso, _)| *iso))
        .collect::<Vec<_>>()
        .join(", ")
}

fn charge_type(family: &str) -> String {
    match family {
        "mpesa" => "mpesa".to_string(),
        "franco_phone" => "mobile_money_franco".to_string(),
        other => format!("mobile_money_{other}"),
    }
}

/// Country-specific payload shaping. Each family carries its own required
/// sub-fields; defaults follow the vendor's documented fallbacks.
fn build_charge_payload(
    family: &str,
    original_country: &str,
    tx_ref: &str,
    amount: &BigDecimal,
    currency: &str,
    metadata: &Value,
) -> Value {
    let mut payload = json!({
        "tx_ref": tx_ref,
        "amount": amount.to_string(),
        "currency": currency,
        "email": metadata["customerEmail"],
        "phone_number": metadata["phoneNumber"],
        "fullname": metadata["customerName"],
    });
    let fields = payload.as_object_mut().expect("payload is an object");
    match family {
        "ghana" => {
            fields.insert(
                "network".into(),
                json!(metadata["network"].as_str().unwrap_or("MTN")),
            );
        }
        "rwanda" => {
            fields.insert("order_id".into(), metadata["orderId"].clone());
        }
        "uganda" => {
            fields.insert("voucher".into(), metadata["voucher"].clone());
            fields.insert(
                "network".into(),
                json!(metadata["network"].as_str().unwrap_or("MTN")),
            );
            fields.insert("redirect_url".into(), metadata["redirectUrl"].clone());
        }
        "tanzania" => {
            fields.insert(
                "network".into(),
                json!(metadata["network"].as_str().unwrap_or("Halopesa")),
            );
            fields.insert("client_ip".into(), metadata["clientIp"].clone());
            fields.insert("device_fingerprint".into(), metadata["deviceFingerprint"].clone());
        }
        "franco_phone" => {
            fields.insert("country".into(), json!(original_country));
        }
        _ => {}
    }
    payload
}

/// Mobile-money style adapter. Tenants charge through per-country families;
/// francophone ISO codes collapse into one family that carries the original
/// country code.
pub struct FlutterwaveProvider {
    http: reqwest::Client,
    config: Option<FlutterwaveConfig>,
}

impl FlutterwaveProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, config: None }
    }

    fn config(&self) -> ProviderResult<&FlutterwaveConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| PlatformError::validation("flutterwave adapter used before init"))
    }

    fn vendor_err(message: impl std::fmt::Display) -> PlatformError {
        PlatformError::vendor("flutterwave", message)
    }

    async fn verify_by_id(&self, id: &str) -> ProviderResult<Value> {
        let cfg = self.config()?;
        let resp = self
            .http
            .get(format!("{}/transactions/{id}/verify", cfg.api_base))
            .bearer_auth(&cfg.secret_key)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if body["status"].as_str() != Some("success") {
            let message = body["message"].as_str().unwrap_or("could not verify payment");
            return Err(Self::vendor_err(message));
        }
        Ok(body)
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveProvider {
    fn init(&mut self, credential: &Value) -> ProviderResult<()> {
        let cred: FlutterwaveCredential = serde_json::from_value(credential.clone())
            .map_err(|_| {
                PlatformError::validation("flutterwave requires both publicKey and secretKey")
            })?;
        if cred.public_key.is_empty() || cred.secret_key.is_empty() {
            return Err(PlatformError::validation(
                "flutterwave requires both publicKey and secretKey",
            ));
        }
        self.config = Some(FlutterwaveConfig {
            secret_key: cred.secret_key,
            default_country: cred
                .default_country
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
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
        let country_input = metadata["country"]
            .as_str()
            .unwrap_or(&cfg.default_country)
            .to_string();
        let resolved = resolve_country(&country_input);
        if !MOBILE_MONEY_FAMILIES.contains(&resolved.family.as_str()) {
            return Err(PlatformError::UnsupportedVariant(format!(
                "mobile money not supported for country '{}'. Supported: {}",
                country_input,
                supported_variants(),
            )));
        }

        let tx_ref = metadata["txRef"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("tx-{}", Uuid::new_v4()));
        let payload = build_charge_payload(
            &resolved.family,
            &resolved.original,
            &tx_ref,
            amount,
            currency,
            metadata,
        );

        let resp = self
            .http
            .post(format!("{}/charges", cfg.api_base))
            .query(&[("type", charge_type(&resolved.family))])
            .bearer_auth(&cfg.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if body["status"].as_str() != Some("success") {
            let message = body["message"].as_str().unwrap_or("charge rejected");
            return Err(Self::vendor_err(message));
        }

        let vendor_status = body["data"]["status"]
            .as_str()
            .or(body["status"].as_str())
            .unwrap_or("pending")
            .to_string();
        let redirect_url = body["meta"]["authorization"]["redirect"]
            .as_str()
            .or(body["data"]["auth_url"].as_str())
            .map(str::to_string);
        Ok(CreatedPayment { provider_ref: tx_ref, vendor_status, redirect_url })
    }

    async fn capture_payment(&self, provider_ref: &str) -> ProviderResult<bool> {
        let body = self.verify_by_id(provider_ref).await?;
        Ok(body["data"]["status"].as_str() == Some("successful"))
    }

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Option<&BigDecimal>,
    ) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let mut payload = json!({});
        if let Some(amount) = amount {
            payload["amount"] = json!(amount.to_string());
        }
        let resp = self
            .http
            .post(format!("{}/transactions/{provider_ref}/refund", cfg.api_base))
            .bearer_auth(&cfg.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if body["status"].as_str() != Some("success") {
            let message = body["message"].as_str().unwrap_or("refund failed");
            return Err(Self::vendor_err(message));
        }
        Ok(true)
    }

    async fn verify_webhook_signature(
        &self,
        _payload: &[u8],
        headers: &HeaderMap,
        secret: &str,
    ) -> ProviderResult<bool> {
        let Some(signature) = headers.get("verif-hash").and_then(|v| v.to_str().ok()) else {
            return Ok(false);
        };
        Ok(common_crypto::constant_time_eq(signature.as_bytes(), secret.as_bytes()))
    }

    async fn verify_transaction_by_reference(&self, tx_ref: &str) -> ProviderResult<bool> {
        let cfg = self.config()?;
        let resp = self
            .http
            .get(format!("{}/transactions/verify_by_reference", cfg.api_base))
            .query(&[("tx_ref", tx_ref)])
            .bearer_auth(&cfg.secret_key)
            .send()
            .await
            .map_err(Self::vendor_err)?;
        let body: Value = resp.json().await.map_err(Self::vendor_err)?;
        if body["status"].as_str() != Some("success") {
            return Err(Self::vendor_err("error verifying payment by reference"));
        }
        Ok(body["data"]["status"].as_str() == Some("successful"))
    }
}
