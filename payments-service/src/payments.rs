use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PlatformError;
use crate::providers::ProviderKind;
use crate::status::{is_valid_transition, map_vendor_status, PaymentStatus};
use crate::store::{PaymentRecord, TenantApp, TransitionOutcome};
use crate::AppState;

/// Drive a payment through the tenant's configured adapter and persist the
/// canonical record. Adapter failures propagate with the vendor message
/// attached and are never retried here.
pub async fn create_payment(
    state: &AppState,
    app: &TenantApp,
    provider_name: &str,
    amount: &BigDecimal,
    currency: &str,
    metadata: &Value,
) -> Result<PaymentRecord, PlatformError> {
    if !common_money::is_positive_amount(amount) {
        return Err(PlatformError::validation("amount must be positive"));
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PlatformError::validation("currency must be a 3-letter code"));
    }

    let (kind, mut adapter) = state.registry.resolve(provider_name)?;
    let credential = state
        .store
        .active_credential(app.id, kind.as_str())
        .await?
        .ok_or_else(|| PlatformError::ConfigNotFound {
            app_id: app.id,
            provider: kind.as_str().to_string(),
        })?;
    adapter.init(&credential.credentials)?;

    let amount = common_money::normalize_scale(amount);
    let created = adapter.create_payment(&amount, currency, metadata).await?;
    let status = map_vendor_status(&created.vendor_status);

    let mut stored_metadata = match metadata {
        Value::Object(_) => metadata.clone(),
        _ => json!({}),
    };
    if let Some(url) = &created.redirect_url {
        stored_metadata["redirectUrl"] = json!(url);
    }

    let now = Utc::now();
    let record = PaymentRecord {
        id: Uuid::new_v4(),
        app_id: app.id,
        organization_id: app.organization_id,
        provider: kind.as_str().to_string(),
        provider_ref: created.provider_ref,
        amount,
        currency: currency.to_ascii_uppercase(),
        status,
        metadata: stored_metadata,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_payment(&record).await?;
    state.metrics.payment_created(kind.as_str(), status.as_str());
    info!(
        app_id = %app.id,
        provider = %kind,
        provider_ref = %record.provider_ref,
        status = %status,
        "created payment"
    );
    Ok(record)
}

/// Explicit refund path: invoke the vendor refund primitive, then apply the
/// guarded terminal -> REFUNDED transition. No refund policy lives here.
pub async fn refund_payment(
    state: &AppState,
    app: &TenantApp,
    payment_id: Uuid,
    amount: Option<&BigDecimal>,
) -> Result<PaymentRecord, PlatformError> {
    let payment = state
        .store
        .find_payment(payment_id)
        .await?
        .filter(|payment| payment.app_id == app.id)
        .ok_or_else(|| PlatformError::PaymentNotFound(payment_id.to_string()))?;
    if !is_valid_transition(payment.status, PaymentStatus::Refunded) {
        return Err(PlatformError::validation(format!(
            "payment in status {} cannot be refunded",
            payment.status
        )));
    }

    let kind = ProviderKind::parse(&payment.provider)
        .ok_or_else(|| PlatformError::UnsupportedProvider(payment.provider.clone()))?;
    let credential = state
        .store
        .active_credential(app.id, kind.as_str())
        .await?
        .ok_or_else(|| PlatformError::ConfigNotFound {
            app_id: app.id,
            provider: kind.as_str().to_string(),
        })?;
    let mut adapter = state.registry.resolve_kind(kind)?;
    adapter.init(&credential.credentials)?;

    let accepted = adapter.refund_payment(&payment.provider_ref, amount).await?;
    if !accepted {
        return Err(PlatformError::vendor(
            kind.as_str(),
            "refund was not accepted",
        ));
    }

    match state
        .store
        .transition_payment_status(payment.id, PaymentStatus::Refunded)
        .await?
    {
        TransitionOutcome::Applied(updated) => {
            info!(
                app_id = %app.id,
                provider = %kind,
                provider_ref = %updated.provider_ref,
                "refunded payment"
            );
            Ok(updated)
        }
        TransitionOutcome::Ignored(current) => {
            // Lost a race against another transition after the vendor call.
            warn!(
                payment_id = %payment.id,
                status = %current,
                "refund transition ignored"
            );
            state
                .store
                .find_payment(payment.id)
                .await?
                .ok_or_else(|| PlatformError::PaymentNotFound(payment.id.to_string()))
        }
        TransitionOutcome::NotFound => {
            Err(PlatformError::PaymentNotFound(payment.id.to_string()))
        }
    }
}
