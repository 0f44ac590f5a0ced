mod support;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use serde_json::{json, Value};
use tower::ServiceExt;

use payments_service::router;
use support::StubBehavior;

fn put_credentials(app_id: &str, provider: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(format!("/payment-config/{app_id}/{provider}"))
        .method("PUT")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn upsert_then_list_masks_secret_material() {
    let ctx = support::test_state(StubBehavior::default());
    let app = ctx.seed_app().await;
    let router = router(ctx.state.clone());

    let resp = router
        .clone()
        .oneshot(put_credentials(
            &app.id.to_string(),
            "flutterwave",
            json!({"publicKey": "FLWPUBK-12345678", "secretKey": "FLWSECK-87654321", "secretHash": "abc"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/payment-config/{}", app.id))
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let bytes = to_bytes(resp.into_body(), 1024 * 16).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let entries = body.as_array().expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["provider"], "flutterwave");
    assert_eq!(entries[0]["active"], true);
    let secret = entries[0]["credentials"]["secretKey"].as_str().unwrap();
    assert!(!secret.contains("FLWSECK-8765"), "secret is masked: {secret}");
    assert!(secret.starts_with("***"));
}

#[tokio::test]
async fn deactivate_hides_the_credential_from_payment_creation() {
    let ctx = support::test_state(StubBehavior::default());
    let app = ctx.seed_app().await;
    let router = router(ctx.state.clone());

    router
        .clone()
        .oneshot(put_credentials(
            &app.id.to_string(),
            "flutterwave",
            json!({"publicKey": "pk", "secretKey": "sk"}),
        ))
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/payment-config/{}/flutterwave", app.id))
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    assert!(ctx
        .state
        .store
        .active_credential(app.id, "flutterwave")
        .await
        .unwrap()
        .is_none());

    // Deactivating twice reports config_not_found.
    let resp = router
        .oneshot(
            Request::builder()
                .uri(format!("/payment-config/{}/flutterwave", app.id))
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn upsert_rejects_unknown_apps_and_providers() {
    let ctx = support::test_state(StubBehavior::default());
    let app = ctx.seed_app().await;
    let router = router(ctx.state.clone());

    let resp = router
        .clone()
        .oneshot(put_credentials(
            &uuid::Uuid::new_v4().to_string(),
            "flutterwave",
            json!({"publicKey": "pk", "secretKey": "sk"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = router
        .oneshot(put_credentials(
            &app.id.to_string(),
            "coinbase",
            json!({"apiKey": "k"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("unsupported_provider")
    );
}
