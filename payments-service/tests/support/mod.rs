#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use payments_service::api_keys::ApiKeyManager;
use payments_service::config::PlatformConfig;
use payments_service::error::PlatformError;
use payments_service::metrics::PlatformMetrics;
use payments_service::providers::{
    CreatedPayment, PaymentProvider, ProviderKind, ProviderRegistry, ProviderResult,
};
use payments_service::store::{MemoryStore, PaymentRecord, PlatformStore, TenantApp};
use payments_service::AppState;

/// App + payment pair seeded by flow tests.
pub struct StubApp {
    pub app: TenantApp,
    pub payment: PaymentRecord,
}

/// Behavior knobs for the stub vendor adapter registered in tests.
#[derive(Clone)]
pub struct StubBehavior {
    /// Vendor transaction reference returned by create; None generates one.
    pub tx_ref: Option<String>,
    /// Vendor status string returned by create.
    pub vendor_status: String,
    /// Result of the authoritative verify-by-reference call.
    pub verify_result: bool,
    pub refund_ok: bool,
    pub redirect_url: Option<String>,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            tx_ref: None,
            vendor_status: "pending".to_string(),
            verify_result: true,
            refund_ok: true,
            redirect_url: None,
        }
    }
}

pub struct StubProvider {
    behavior: Arc<StubBehavior>,
    secret: Option<String>,
}

#[async_trait]
impl PaymentProvider for StubProvider {
    fn init(&mut self, credential: &Value) -> ProviderResult<()> {
        if credential["secretKey"].as_str().unwrap_or_default().is_empty() {
            return Err(PlatformError::validation("stub credential requires secretKey"));
        }
        self.secret = credential["secretHash"].as_str().map(str::to_string);
        Ok(())
    }

    async fn create_payment(
        &self,
        _amount: &BigDecimal,
        _currency: &str,
        metadata: &Value,
    ) -> ProviderResult<CreatedPayment> {
        if metadata["failCreate"].as_bool().unwrap_or(false) {
            return Err(PlatformError::vendor("stub", "vendor rejected the charge"));
        }
        let provider_ref = self
            .behavior
            .tx_ref
            .clone()
            .unwrap_or_else(|| format!("tx-{}", Uuid::new_v4()));
        Ok(CreatedPayment {
            provider_ref,
            vendor_status: self.behavior.vendor_status.clone(),
            redirect_url: self.behavior.redirect_url.clone(),
        })
    }

    async fn capture_payment(&self, _provider_ref: &str) -> ProviderResult<bool> {
        Ok(true)
    }

    async fn refund_payment(
        &self,
        _provider_ref: &str,
        _amount: Option<&BigDecimal>,
    ) -> ProviderResult<bool> {
        Ok(self.behavior.refund_ok)
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
        Ok(signature == secret)
    }

    async fn verify_transaction_by_reference(&self, _tx_ref: &str) -> ProviderResult<bool> {
        Ok(self.behavior.verify_result)
    }
}

/// AppState over an in-memory store, with the stub adapter registered for
/// the flutterwave kind. The concrete store handle is kept for seeding.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn test_state(behavior: StubBehavior) -> TestContext {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let behavior = Arc::new(behavior);
    let http = reqwest::Client::new();
    let mut registry = ProviderRegistry::with_defaults(http.clone());
    {
        let behavior = behavior.clone();
        registry.register(ProviderKind::Flutterwave, move || {
            Box::new(StubProvider { behavior: behavior.clone(), secret: None })
        });
    }
    let config = Arc::new(PlatformConfig {
        api_key_secret: "test-platform-secret".to_string(),
        credential_master_key: common_crypto::MasterKey::from_bytes([7u8; 32]).unwrap(),
        database_url: None,
        notify_timeout_secs: 1,
    });
    let store_dyn: Arc<dyn PlatformStore> = store.clone();
    let state = AppState {
        keys: ApiKeyManager::new(store_dyn.clone(), config.api_key_secret.clone()),
        store: store_dyn,
        registry: Arc::new(registry),
        http,
        metrics: Arc::new(PlatformMetrics::new()),
        config,
    };
    TestContext { state, store }
}

impl TestContext {
    pub async fn seed_app(&self) -> TenantApp {
        let app = TenantApp {
            id: Uuid::new_v4(),
            name: "storefront".to_string(),
            environment: "test".to_string(),
            organization_id: Uuid::new_v4(),
        };
        self.store.seed_app(app.clone()).await;
        app
    }

    pub async fn seed_credential(&self, app: &TenantApp, credentials: Value) {
        self.state
            .store
            .upsert_credential(app.id, "flutterwave", &credentials)
            .await
            .expect("seed credential");
    }

    pub async fn issue_key(&self, app: &TenantApp) -> String {
        let (_, key) = self.state.keys.rotate(app.id).await.expect("rotate key");
        key
    }
}
