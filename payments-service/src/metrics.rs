use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Platform counters. Constructed once at startup and injected through
/// AppState; nothing registers into a global registry.
pub struct PlatformMetrics {
    pub registry: Registry,
    payments_created_total: IntCounterVec,
    webhook_events_total: IntCounterVec,
    api_key_validations_total: IntCounterVec,
    tenant_notify_failures_total: IntCounter,
}

impl PlatformMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let payments_created_total = IntCounterVec::new(
            Opts::new("payments_created_total", "Payments persisted, by provider and canonical status"),
            &["provider", "status"],
        )
        .unwrap();
        let webhook_events_total = IntCounterVec::new(
            Opts::new("webhook_events_total", "Webhook deliveries, by provider and outcome"),
            &["provider", "outcome"],
        )
        .unwrap();
        let api_key_validations_total = IntCounterVec::new(
            Opts::new("api_key_validations_total", "API key validation attempts"),
            &["result"],
        )
        .unwrap();
        let tenant_notify_failures_total = IntCounter::new(
            "tenant_notify_failures_total",
            "Best-effort tenant callback notifications that failed",
        )
        .unwrap();
        let _ = registry.register(Box::new(payments_created_total.clone()));
        let _ = registry.register(Box::new(webhook_events_total.clone()));
        let _ = registry.register(Box::new(api_key_validations_total.clone()));
        let _ = registry.register(Box::new(tenant_notify_failures_total.clone()));
        PlatformMetrics {
            registry,
            payments_created_total,
            webhook_events_total,
            api_key_validations_total,
            tenant_notify_failures_total,
        }
    }

    pub fn payment_created(&self, provider: &str, status: &str) {
        self.payments_created_total.with_label_values(&[provider, status]).inc();
    }

    pub fn webhook_event(&self, provider: &str, outcome: &str) {
        self.webhook_events_total.with_label_values(&[provider, outcome]).inc();
    }

    pub fn api_key_validation(&self, allowed: bool) {
        let result = if allowed { "allowed" } else { "rejected" };
        self.api_key_validations_total.with_label_values(&[result]).inc();
    }

    pub fn notify_failed(&self) {
        self.tenant_notify_failures_total.inc();
    }
}

impl Default for PlatformMetrics {
    fn default() -> Self {
        Self::new()
    }
}
