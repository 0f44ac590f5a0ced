use axum::http::HeaderMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::notify;
use crate::providers::ProviderKind;
use crate::status::PaymentStatus;
use crate::store::{PaymentRecord, TransitionOutcome};
use crate::AppState;

pub struct ReconcileOutcome {
    pub payment: PaymentRecord,
    /// True when this delivery performed the status transition; false for
    /// duplicate or out-of-order redeliveries.
    pub transitioned: bool,
}

/// Pull the vendor transaction reference out of a webhook event. Shapes are
/// vendor-specific; anything else is a malformed payload.
pub fn vendor_tx_ref(kind: ProviderKind, event: &Value) -> Option<String> {
    let value = match kind {
        ProviderKind::Flutterwave => event["data"]["tx_ref"].as_str(),
        ProviderKind::Stripe => event["data"]["object"]["id"].as_str(),
        ProviderKind::Paypal => event["resource"]["id"].as_str(),
    };
    value.map(str::to_string)
}

/// One webhook delivery, reconciled end to end:
/// parse -> payment lookup -> credential -> signature -> authoritative
/// re-verification -> guarded exactly-once transition -> best-effort tenant
/// notification. The webhook body is never trusted for outcome.
pub async fn reconcile(
    state: &AppState,
    provider: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ReconcileOutcome, PlatformError> {
    let kind = ProviderKind::parse(provider)
        .ok_or_else(|| PlatformError::UnsupportedProvider(provider.to_string()))?;
    let event: Value = serde_json::from_slice(body)
        .map_err(|_| PlatformError::validation("invalid webhook payload"))?;
    let tx_ref = vendor_tx_ref(kind, &event)
        .ok_or_else(|| PlatformError::validation("webhook payload missing transaction reference"))?;

    let payment = state
        .store
        .find_payment_by_provider_ref(kind.as_str(), &tx_ref)
        .await?
        .ok_or_else(|| PlatformError::PaymentNotFound(tx_ref.clone()))?;

    let credential = state
        .store
        .active_credential(payment.app_id, kind.as_str())
        .await?
        .ok_or_else(|| PlatformError::ConfigNotFound {
            app_id: payment.app_id,
            provider: kind.as_str().to_string(),
        })?;
    let secret = credential.credentials["secretHash"].as_str().unwrap_or_default();

    let mut adapter = state.registry.resolve_kind(kind)?;
    adapter.init(&credential.credentials)?;

    let signed = adapter.verify_webhook_signature(body, headers, secret).await?;
    if !signed {
        warn!(app_id = %payment.app_id, provider = %kind, tx_ref = %tx_ref, "webhook signature mismatch");
        return Err(PlatformError::InvalidSignature);
    }

    // Authoritative source of truth for the outcome.
    let verified = adapter.verify_transaction_by_reference(&tx_ref).await?;
    let target = if verified { PaymentStatus::Success } else { PaymentStatus::Failed };

    let (payment, transitioned) = match state
        .store
        .transition_payment_status(payment.id, target)
        .await?
    {
        TransitionOutcome::Applied(updated) => {
            info!(
                provider = %kind,
                tx_ref = %tx_ref,
                status = %target,
                "reconciled payment"
            );
            (updated, true)
        }
        TransitionOutcome::Ignored(current) => {
            debug!(
                provider = %kind,
                tx_ref = %tx_ref,
                status = %current,
                "webhook redelivery ignored; payment already terminal"
            );
            let current_record = state
                .store
                .find_payment(payment.id)
                .await?
                .unwrap_or(payment);
            (current_record, false)
        }
        TransitionOutcome::NotFound => {
            return Err(PlatformError::PaymentNotFound(tx_ref));
        }
    };

    // Fire and forget: the ack to the vendor never waits on the tenant.
    notify::spawn_tenant_notification(state, &credential.credentials, &payment);

    Ok(ReconcileOutcome { payment, transitioned })
}
