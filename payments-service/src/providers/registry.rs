use std::collections::HashMap;

use crate::error::PlatformError;
use crate::providers::flutterwave::FlutterwaveProvider;
use crate::providers::paypal::PaypalProvider;
use crate::providers::stripe::StripeProvider;
use crate::providers::{PaymentProvider, ProviderKind};

type Factory = Box<dyn Fn() -> Box<dyn PaymentProvider> + Send + Sync>;

/// Factory registry keyed by provider kind. Every resolve hands out a fresh,
/// unconfigured adapter so no credential state can leak across tenants or
/// requests.
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, Factory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registry with the built-in adapters wired to a shared HTTP client.
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        {
            let http = http.clone();
            registry.register(ProviderKind::Stripe, move || {
                Box::new(StripeProvider::new(http.clone()))
            });
        }
        {
            let http = http.clone();
            registry.register(ProviderKind::Flutterwave, move || {
                Box::new(FlutterwaveProvider::new(http.clone()))
            });
        }
        registry.register(ProviderKind::Paypal, move || {
            Box::new(PaypalProvider::new(http.clone()))
        });
        registry
    }

    /// Register (or replace) the factory for a provider kind.
    pub fn register<F>(&mut self, kind: ProviderKind, factory: F)
    where
        F: Fn() -> Box<dyn PaymentProvider> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    /// Case-insensitive lookup by name; unknown names are rejected.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(ProviderKind, Box<dyn PaymentProvider>), PlatformError> {
        let kind = ProviderKind::parse(name)
            .ok_or_else(|| PlatformError::UnsupportedProvider(name.to_string()))?;
        let adapter = self.resolve_kind(kind)?;
        Ok((kind, adapter))
    }

    pub fn resolve_kind(
        &self,
        kind: ProviderKind,
    ) -> Result<Box<dyn PaymentProvider>, PlatformError> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| PlatformError::UnsupportedProvider(kind.as_str().to_string()))?;
        Ok(factory())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CreatedPayment, ProviderResult};
    use async_trait::async_trait;
    use axum::http::HeaderMap;
    use bigdecimal::BigDecimal;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider;

    #[async_trait]
    impl crate::providers::PaymentProvider for CountingProvider {
        fn init(&mut self, _credential: &Value) -> ProviderResult<()> {
            Ok(())
        }
        async fn create_payment(
            &self,
            _amount: &BigDecimal,
            _currency: &str,
            _metadata: &Value,
        ) -> ProviderResult<CreatedPayment> {
            unreachable!("not exercised")
        }
        async fn capture_payment(&self, _provider_ref: &str) -> ProviderResult<bool> {
            Ok(false)
        }
        async fn refund_payment(
            &self,
            _provider_ref: &str,
            _amount: Option<&BigDecimal>,
        ) -> ProviderResult<bool> {
            Ok(false)
        }
        async fn verify_webhook_signature(
            &self,
            _payload: &[u8],
            _headers: &HeaderMap,
            _secret: &str,
        ) -> ProviderResult<bool> {
            Ok(false)
        }
        async fn verify_transaction_by_reference(&self, _tx_ref: &str) -> ProviderResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let registry = ProviderRegistry::with_defaults(reqwest::Client::new());
        let err = registry.resolve("coinbase").unwrap_err();
        assert!(matches!(err, PlatformError::UnsupportedProvider(name) if name == "coinbase"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ProviderRegistry::with_defaults(reqwest::Client::new());
        let (kind, _) = registry.resolve("FlutterWave").expect("resolve");
        assert_eq!(kind, ProviderKind::Flutterwave);
    }

    #[test]
    fn every_resolve_returns_a_fresh_instance() {
        let instances = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        let counter = instances.clone();
        registry.register(ProviderKind::Stripe, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingProvider)
        });
        let _ = registry.resolve("stripe").expect("first");
        let _ = registry.resolve("stripe").expect("second");
        assert_eq!(instances.load(Ordering::SeqCst), 2);
    }
}
