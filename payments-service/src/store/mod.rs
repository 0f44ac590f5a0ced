use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::status::PaymentStatus;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Customer-registered application scoped to one organization. Provisioning
/// happens outside this service; the store only reads apps.
#[derive(Debug, Clone)]
pub struct TenantApp {
    pub id: Uuid,
    pub name: String,
    pub environment: String,
    pub organization_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub app_id: Uuid,
    pub key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub app_id: Uuid,
    pub provider: String,
    /// Decrypted vendor credential blob. Opaque to the platform except for
    /// the `secretHash` and `callbackUrl` fields reconciliation reads.
    pub credentials: Value,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub app_id: Uuid,
    pub organization_id: Uuid,
    pub provider: String,
    /// Vendor transaction reference, unique within a provider namespace.
    pub provider_ref: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// External representation: tenant identifiers stay internal.
    pub fn safe(&self) -> Value {
        json!({
            "id": self.id,
            "provider": self.provider,
            "providerRef": self.provider_ref,
            "amount": self.amount.to_string(),
            "currency": self.currency,
            "status": self.status,
            "metadata": self.metadata,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

/// Result of a guarded status transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was valid and this caller performed it.
    Applied(PaymentRecord),
    /// The payment was already past the requested transition; nothing was
    /// written. Carries the status observed at decision time.
    Ignored(PaymentStatus),
    NotFound,
}

/// Persistence seam for the platform core. Implementations must make
/// `rotate_api_key` atomic and `transition_payment_status` a guarded,
/// exactly-once write, since both are invoked concurrently per tenant.
#[async_trait]
pub trait PlatformStore: Send + Sync {
    async fn find_app(&self, app_id: Uuid) -> Result<Option<TenantApp>>;

    async fn active_credential(
        &self,
        app_id: Uuid,
        provider: &str,
    ) -> Result<Option<CredentialRecord>>;
    async fn upsert_credential(
        &self,
        app_id: Uuid,
        provider: &str,
        credentials: &Value,
    ) -> Result<CredentialRecord>;
    async fn deactivate_credential(&self, app_id: Uuid, provider: &str) -> Result<bool>;
    async fn list_credentials(&self, app_id: Uuid) -> Result<Vec<CredentialRecord>>;

    /// Deactivate any active key for the app and persist the new one as the
    /// single active key, as one atomic unit.
    async fn rotate_api_key(&self, app_id: Uuid, key: &str) -> Result<ApiKeyRecord>;
    async fn find_active_api_key(&self, raw: &str) -> Result<Option<(ApiKeyRecord, TenantApp)>>;
    async fn count_active_api_keys(&self, app_id: Uuid) -> Result<i64>;

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()>;
    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>>;
    async fn find_payment_by_provider_ref(
        &self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentRecord>>;
    async fn transition_payment_status(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
    ) -> Result<TransitionOutcome>;
}
