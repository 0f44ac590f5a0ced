use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::PaymentRecord;
use crate::AppState;

/// Best-effort outbound notification to the tenant's registered callback URL.
/// Runs detached with a hard timeout; failures are logged and never retried,
/// and the vendor acknowledgment never waits on this.
pub fn spawn_tenant_notification(state: &AppState, credentials: &Value, payment: &PaymentRecord) {
    let Some(url) = credentials["callbackUrl"].as_str() else {
        return;
    };
    let url = url.to_string();
    let secret = credentials["secretHash"].as_str().unwrap_or_default().to_string();
    let body = json!({
        "txRef": payment.provider_ref,
        "status": payment.status,
        "amount": payment.amount.to_string(),
        "currency": payment.currency,
    });
    let tx_ref = payment.provider_ref.clone();
    let client = state.http.clone();
    let timeout = Duration::from_secs(state.config.notify_timeout_secs);
    let metrics = state.metrics.clone();

    tokio::spawn(async move {
        let result = client
            .post(&url)
            .header("verif-hash", &secret)
            .timeout(timeout)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(%url, %tx_ref, "tenant callback delivered");
            }
            Ok(resp) => {
                warn!(%url, %tx_ref, status = %resp.status(), "tenant callback rejected");
                metrics.notify_failed();
            }
            Err(err) => {
                warn!(%url, %tx_ref, error = %err, "tenant callback failed");
                metrics.notify_failed();
            }
        }
    });
}
