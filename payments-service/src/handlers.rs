use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use bigdecimal::BigDecimal;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::PlatformError;
use crate::store::CredentialRecord;
use crate::{payments, webhook, AppState};

/// App resolved from a validated API key, injected by [`require_api_key`].
#[derive(Clone)]
pub struct AuthedApp(pub crate::store::TenantApp);

/// API-key authentication for the payment routes. The raw key travels in the
/// X-Api-Key header; the manager does the lookup + checksum verification.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, PlatformError> {
    let raw = req
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(PlatformError::ApiKeyMissing)?
        .to_string();
    let validated = state.keys.validate(&raw).await;
    state.metrics.api_key_validation(validated.is_ok());
    let app = validated?;
    req.extensions_mut().insert(AuthedApp(app));
    Ok(next.run(req).await)
}

pub async fn rotate_key(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
) -> Result<Json<Value>, PlatformError> {
    let (app, key) = state.keys.rotate(app_id).await?;
    // The raw key is returned once and never re-displayed.
    Ok(Json(json!({ "appId": app.id, "apiKey": key })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentRequest {
    pub provider: String,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub metadata: Value,
}

pub async fn init_payment(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
    Extension(AuthedApp(app)): Extension<AuthedApp>,
    Json(req): Json<InitPaymentRequest>,
) -> Result<(StatusCode, Json<Value>), PlatformError> {
    if app.id != app_id {
        return Err(PlatformError::AppMismatch);
    }
    let payment =
        payments::create_payment(&state, &app, &req.provider, &req.amount, &req.currency, &req.metadata)
            .await?;
    Ok((StatusCode::CREATED, Json(payment.safe())))
}

pub async fn pay(
    State(state): State<AppState>,
    Extension(AuthedApp(app)): Extension<AuthedApp>,
    Json(req): Json<InitPaymentRequest>,
) -> Result<(StatusCode, Json<Value>), PlatformError> {
    let payment =
        payments::create_payment(&state, &app, &req.provider, &req.amount, &req.currency, &req.metadata)
            .await?;
    Ok((StatusCode::CREATED, Json(payment.safe())))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub payment_id: Uuid,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
    Extension(AuthedApp(app)): Extension<AuthedApp>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Value>, PlatformError> {
    if app.id != app_id {
        return Err(PlatformError::AppMismatch);
    }
    let payment =
        payments::refund_payment(&state, &app, req.payment_id, req.amount.as_ref()).await?;
    Ok(Json(payment.safe()))
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, PlatformError> {
    let result = webhook::reconcile(&state, &provider, &headers, &body).await;
    let outcome_label = match &result {
        Ok(outcome) if outcome.transitioned => "applied",
        Ok(_) => "replayed",
        Err(_) => "rejected",
    };
    // Label with the closed provider set to keep metric cardinality bounded.
    let provider_label = crate::providers::ProviderKind::parse(&provider)
        .map(|kind| kind.as_str())
        .unwrap_or("unknown");
    state.metrics.webhook_event(provider_label, outcome_label);
    let outcome = result?;
    Ok(Json(json!({
        "status": "ok",
        "txRef": outcome.payment.provider_ref,
        "paymentStatus": outcome.payment.status,
    })))
}

pub async fn upsert_credential(
    State(state): State<AppState>,
    Path((app_id, provider)): Path<(Uuid, String)>,
    Json(credentials): Json<Value>,
) -> Result<Json<Value>, PlatformError> {
    if !credentials.is_object() {
        return Err(PlatformError::validation("credentials must be a JSON object"));
    }
    let app = state
        .store
        .find_app(app_id)
        .await?
        .ok_or(PlatformError::AppNotFound(app_id))?;
    let (kind, _) = state.registry.resolve(&provider)?;
    let record = state
        .store
        .upsert_credential(app.id, kind.as_str(), &credentials)
        .await?;
    Ok(Json(masked_view(&record)))
}

pub async fn deactivate_credential(
    State(state): State<AppState>,
    Path((app_id, provider)): Path<(Uuid, String)>,
) -> Result<Json<Value>, PlatformError> {
    let (kind, _) = state.registry.resolve(&provider)?;
    let removed = state.store.deactivate_credential(app_id, kind.as_str()).await?;
    if !removed {
        return Err(PlatformError::ConfigNotFound {
            app_id,
            provider: kind.as_str().to_string(),
        });
    }
    Ok(Json(json!({ "provider": kind.as_str(), "active": false })))
}

pub async fn list_credentials(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
) -> Result<Json<Value>, PlatformError> {
    let records = state.store.list_credentials(app_id).await?;
    Ok(Json(Value::Array(records.iter().map(masked_view).collect())))
}

/// Secret material never leaves the service: string fields are masked down
/// to their last four characters.
fn masked_view(record: &CredentialRecord) -> Value {
    let fields = match &record.credentials {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let masked = match value {
                    Value::String(s) if s.len() > 4 => {
                        json!(format!("***{}", &s[s.len() - 4..]))
                    }
                    Value::String(_) => json!("***"),
                    other => other.clone(),
                };
                (key.clone(), masked)
            })
            .collect(),
        _ => serde_json::Map::new(),
    };
    json!({
        "provider": record.provider,
        "active": record.active,
        "credentials": Value::Object(fields),
    })
}

pub async fn export_metrics(State(state): State<AppState>) -> Result<String, PlatformError> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.metrics.registry.gather(), &mut buffer)
        .map_err(|err| PlatformError::Storage(anyhow::anyhow!("metrics encode: {err}")))?;
    String::from_utf8(buffer)
        .map_err(|err| PlatformError::Storage(anyhow::anyhow!("metrics encode: {err}")))
}
