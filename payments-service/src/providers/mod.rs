use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::error::PlatformError;

pub mod flutterwave;
pub mod paypal;
pub mod registry;
pub mod stripe;

pub use registry::ProviderRegistry;

pub type ProviderResult<T> = Result<T, PlatformError>;

/// Normalized result of a vendor payment creation. `provider_ref` is the
/// vendor transaction reference later used for webhook lookup and the
/// authoritative re-verification call.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub provider_ref: String,
    pub vendor_status: String,
    pub redirect_url: Option<String>,
}

/// Closed set of supported processors. Extending the platform means adding a
/// variant here and registering a factory, not subclassing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Card-intent style processor.
    Stripe,
    /// Mobile-money style processor with per-country charge families.
    Flutterwave,
    /// Approval-redirect style processor.
    Paypal,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<ProviderKind> {
        match name.to_ascii_lowercase().as_str() {
            "stripe" => Some(ProviderKind::Stripe),
            "flutterwave" => Some(ProviderKind::Flutterwave),
            "paypal" => Some(ProviderKind::Paypal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stripe => "stripe",
            ProviderKind::Flutterwave => "flutterwave",
            ProviderKind::Paypal => "paypal",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract every vendor adapter implements. Adapters are
/// constructed per operation and never shared across tenants; `init` must be
/// called with the tenant's credential blob before any vendor call.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Validate and store vendor configuration. Idempotent; fails when a
    /// required credential field is absent.
    fn init(&mut self, credential: &Value) -> ProviderResult<()>;

    async fn create_payment(
        &self,
        amount: &BigDecimal,
        currency: &str,
        metadata: &Value,
    ) -> ProviderResult<CreatedPayment>;

    async fn capture_payment(&self, provider_ref: &str) -> ProviderResult<bool>;

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Option<&BigDecimal>,
    ) -> ProviderResult<bool>;

    /// Vendor-specific webhook signature check against the tenant's stored
    /// secret. Comparisons against the secret are constant time.
    async fn verify_webhook_signature(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
        secret: &str,
    ) -> ProviderResult<bool>;

    /// Authoritative status re-check at the vendor of record. The webhook
    /// body is never trusted for outcome; this call is.
    async fn verify_transaction_by_reference(&self, tx_ref: &str) -> ProviderResult<bool>;
}

impl std::fmt::Debug for dyn PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn PaymentProvider")
    }
}
