mod support;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use serde_json::{json, Value};
use tower::ServiceExt;

use payments_service::router;
use payments_service::status::PaymentStatus;
use support::{StubBehavior, TestContext};

fn webhook_request(tx_ref: &str, signature: Option<&str>) -> Request<Body> {
    let body = json!({"event": "charge.completed", "data": {"tx_ref": tx_ref, "status": "successful"}});
    let mut builder = Request::builder()
        .uri("/webhooks/flutterwave")
        .method("POST")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("verif-hash", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Seed an app with an active flutterwave-style credential (signature secret
/// "abc") and a PENDING payment for tx-1, created through the orchestrator.
async fn seeded_context(behavior: StubBehavior) -> (TestContext, support::StubApp) {
    let ctx = support::test_state(behavior);
    let app = ctx.seed_app().await;
    ctx.seed_credential(
        &app,
        json!({"publicKey": "pk", "secretKey": "sk", "secretHash": "abc"}),
    )
    .await;
    let payment = payments_service::payments::create_payment(
        &ctx.state,
        &app,
        "flutterwave",
        &bigdecimal::BigDecimal::from(100),
        "GHS",
        &json!({"country": "ghana"}),
    )
    .await
    .expect("create payment");
    assert_eq!(payment.status, PaymentStatus::Pending);
    (ctx, support::StubApp { app, payment })
}

#[tokio::test]
async fn signed_webhook_reconciles_to_success() {
    let (ctx, seeded) = seeded_context(StubBehavior {
        tx_ref: Some("tx-1".to_string()),
        ..StubBehavior::default()
    })
    .await;
    let app = router(ctx.state.clone());

    let resp = app.oneshot(webhook_request("tx-1", Some("abc"))).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let bytes = to_bytes(resp.into_body(), 1024 * 16).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["paymentStatus"], "SUCCESS");

    let stored = ctx
        .state
        .store
        .find_payment_by_provider_ref("flutterwave", "tx-1")
        .await
        .unwrap()
        .expect("payment exists");
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.id, seeded.payment.id, "no duplicate row was created");
}

#[tokio::test]
async fn redelivery_is_idempotent_and_still_acknowledged() {
    let (ctx, seeded) = seeded_context(StubBehavior {
        tx_ref: Some("tx-1".to_string()),
        ..StubBehavior::default()
    })
    .await;
    let app = router(ctx.state.clone());

    let first = app.clone().oneshot(webhook_request("tx-1", Some("abc"))).await.unwrap();
    assert_eq!(first.status().as_u16(), 200);

    // Vendor retry of the identical event.
    let second = app.oneshot(webhook_request("tx-1", Some("abc"))).await.unwrap();
    assert_eq!(second.status().as_u16(), 200);

    let stored = ctx
        .state
        .store
        .find_payment(seeded.payment.id)
        .await
        .unwrap()
        .expect("payment exists");
    assert_eq!(stored.status, PaymentStatus::Success);
}

#[tokio::test]
async fn failed_authoritative_check_marks_payment_failed() {
    let (ctx, seeded) = seeded_context(StubBehavior {
        tx_ref: Some("tx-9".to_string()),
        verify_result: false,
        ..StubBehavior::default()
    })
    .await;
    let app = router(ctx.state.clone());

    let resp = app.oneshot(webhook_request("tx-9", Some("abc"))).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let stored = ctx
        .state
        .store
        .find_payment(seeded.payment.id)
        .await
        .unwrap()
        .expect("payment exists");
    assert_eq!(stored.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn bad_signature_never_mutates_state() {
    let (ctx, seeded) = seeded_context(StubBehavior {
        tx_ref: Some("tx-1".to_string()),
        ..StubBehavior::default()
    })
    .await;
    let app = router(ctx.state.clone());

    let mismatched = app
        .clone()
        .oneshot(webhook_request("tx-1", Some("not-abc")))
        .await
        .unwrap();
    assert_eq!(mismatched.status().as_u16(), 401);
    assert_eq!(
        mismatched.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("invalid_signature")
    );

    let missing = app.oneshot(webhook_request("tx-1", None)).await.unwrap();
    assert_eq!(missing.status().as_u16(), 401);

    let stored = ctx
        .state
        .store
        .find_payment(seeded.payment.id)
        .await
        .unwrap()
        .expect("payment exists");
    assert_eq!(stored.status, PaymentStatus::Pending, "state untouched");
}

#[tokio::test]
async fn unknown_transaction_is_404() {
    let (ctx, _) = seeded_context(StubBehavior {
        tx_ref: Some("tx-1".to_string()),
        ..StubBehavior::default()
    })
    .await;
    let app = router(ctx.state);

    let resp = app.oneshot(webhook_request("tx-unknown", Some("abc"))).await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("payment_not_found")
    );
}

#[tokio::test]
async fn malformed_payload_is_400() {
    let (ctx, _) = seeded_context(StubBehavior::default()).await;
    let app = router(ctx.state);

    let req = Request::builder()
        .uri("/webhooks/flutterwave")
        .method("POST")
        .header("content-type", "application/json")
        .header("verif-hash", "abc")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // Parseable JSON without a transaction reference is also malformed.
    let req = Request::builder()
        .uri("/webhooks/flutterwave")
        .method("POST")
        .header("content-type", "application/json")
        .header("verif-hash", "abc")
        .body(Body::from(json!({"data": {}}).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_credential_is_400() {
    let (ctx, seeded) = seeded_context(StubBehavior {
        tx_ref: Some("tx-1".to_string()),
        ..StubBehavior::default()
    })
    .await;
    // Credential deactivated between payment creation and webhook delivery.
    ctx.state
        .store
        .deactivate_credential(seeded.app.id, "flutterwave")
        .await
        .unwrap();
    let app = router(ctx.state.clone());

    let resp = app.oneshot(webhook_request("tx-1", Some("abc"))).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("config_not_found")
    );

    let stored = ctx.state.store.find_payment(seeded.payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn unknown_provider_path_is_400() {
    let (ctx, _) = seeded_context(StubBehavior::default()).await;
    let app = router(ctx.state);

    let req = Request::builder()
        .uri("/webhooks/coinbase")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(json!({"data": {"tx_ref": "tx-1"}}).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("unsupported_provider")
    );
}
