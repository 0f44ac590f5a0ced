use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

pub mod api_keys;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod notify;
pub mod payments;
pub mod providers;
pub mod status;
pub mod store;
pub mod webhook;

use api_keys::ApiKeyManager;
use config::PlatformConfig;
use metrics::PlatformMetrics;
use providers::ProviderRegistry;
use store::PlatformStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PlatformStore>,
    pub registry: Arc<ProviderRegistry>,
    pub keys: ApiKeyManager,
    pub http: reqwest::Client,
    pub metrics: Arc<PlatformMetrics>,
    pub config: Arc<PlatformConfig>,
}

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/payments/:app_id/init", post(handlers::init_payment))
        .route("/payments/pay", post(handlers::pay))
        .route("/payments/:app_id/refund", post(handlers::refund_payment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_api_key,
        ));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(handlers::export_metrics))
        .route("/apps/:app_id/keys/rotate", post(handlers::rotate_key))
        .route("/payment-config/:app_id", get(handlers::list_credentials))
        .route(
            "/payment-config/:app_id/:provider",
            put(handlers::upsert_credential).delete(handlers::deactivate_credential),
        )
        .route("/webhooks/:provider", post(handlers::handle_webhook))
        .merge(authed)
        .with_state(state)
}
