use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::status::{is_valid_transition, PaymentStatus};
use crate::store::{
    ApiKeyRecord, CredentialRecord, PaymentRecord, PlatformStore, TenantApp, TransitionOutcome,
};

/// Non-durable store used when no DATABASE_URL is configured, and by the
/// test suite. Uniqueness and transition guards mirror the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    apps: Vec<TenantApp>,
    api_keys: Vec<ApiKeyRecord>,
    credentials: Vec<CredentialRecord>,
    payments: Vec<PaymentRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tenant app. App provisioning is owned by another service; this
    /// exists for local development and tests.
    pub async fn seed_app(&self, app: TenantApp) {
        let mut inner = self.inner.write().await;
        inner.apps.retain(|existing| existing.id != app.id);
        inner.apps.push(app);
    }
}

#[async_trait]
impl PlatformStore for MemoryStore {
    async fn find_app(&self, app_id: Uuid) -> Result<Option<TenantApp>> {
        let inner = self.inner.read().await;
        Ok(inner.apps.iter().find(|app| app.id == app_id).cloned())
    }

    async fn active_credential(
        &self,
        app_id: Uuid,
        provider: &str,
    ) -> Result<Option<CredentialRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .iter()
            .find(|c| c.app_id == app_id && c.provider == provider && c.active)
            .cloned())
    }

    async fn upsert_credential(
        &self,
        app_id: Uuid,
        provider: &str,
        credentials: &Value,
    ) -> Result<CredentialRecord> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .credentials
            .iter_mut()
            .find(|c| c.app_id == app_id && c.provider == provider)
        {
            existing.credentials = credentials.clone();
            existing.active = true;
            return Ok(existing.clone());
        }
        let record = CredentialRecord {
            app_id,
            provider: provider.to_string(),
            credentials: credentials.clone(),
            active: true,
        };
        inner.credentials.push(record.clone());
        Ok(record)
    }

    async fn deactivate_credential(&self, app_id: Uuid, provider: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .credentials
            .iter_mut()
            .find(|c| c.app_id == app_id && c.provider == provider && c.active)
        {
            Some(credential) => {
                credential.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_credentials(&self, app_id: Uuid) -> Result<Vec<CredentialRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .iter()
            .filter(|c| c.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn rotate_api_key(&self, app_id: Uuid, key: &str) -> Result<ApiKeyRecord> {
        // Single write-lock section: no interleaving can observe zero or two
        // active keys for the app.
        let mut inner = self.inner.write().await;
        for existing in inner.api_keys.iter_mut().filter(|k| k.app_id == app_id) {
            existing.active = false;
        }
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            app_id,
            key: key.to_string(),
            active: true,
            created_at: Utc::now(),
        };
        inner.api_keys.push(record.clone());
        Ok(record)
    }

    async fn find_active_api_key(&self, raw: &str) -> Result<Option<(ApiKeyRecord, TenantApp)>> {
        let inner = self.inner.read().await;
        let Some(record) = inner
            .api_keys
            .iter()
            .find(|k| k.active && k.key == raw)
            .cloned()
        else {
            return Ok(None);
        };
        let app = inner.apps.iter().find(|app| app.id == record.app_id).cloned();
        Ok(app.map(|app| (record, app)))
    }

    async fn count_active_api_keys(&self, app_id: Uuid) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .api_keys
            .iter()
            .filter(|k| k.app_id == app_id && k.active)
            .count() as i64)
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner
            .payments
            .iter()
            .any(|p| p.provider == payment.provider && p.provider_ref == payment.provider_ref)
        {
            bail!(
                "duplicate provider reference {} for provider {}",
                payment.provider_ref,
                payment.provider
            );
        }
        inner.payments.push(payment.clone());
        Ok(())
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.payments.iter().find(|p| p.id == payment_id).cloned())
    }

    async fn find_payment_by_provider_ref(
        &self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .iter()
            .find(|p| p.provider == provider && p.provider_ref == provider_ref)
            .cloned())
    }

    async fn transition_payment_status(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
    ) -> Result<TransitionOutcome> {
        let mut inner = self.inner.write().await;
        let Some(payment) = inner.payments.iter_mut().find(|p| p.id == payment_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !is_valid_transition(payment.status, to) {
            return Ok(TransitionOutcome::Ignored(payment.status));
        }
        payment.status = to;
        payment.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(payment.clone()))
    }
}
