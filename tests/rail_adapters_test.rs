//! Downstream rails behind the router, with wiremock standing in for the
//! PayPal service, the crypto service and the NBS QR registry.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use psp_orchestrator::api::{self, AppState};
use psp_orchestrator::config::RailConfig;
use psp_orchestrator::database::in_memory::InMemoryStore;
use psp_orchestrator::database::repository::TransactionLedger;
use psp_orchestrator::payments::types::TransactionStatus;
use psp_orchestrator::services::OutboundDispatcher;

fn app_with(rails: RailConfig) -> (Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::demo());
    let (dispatcher, rx) = OutboundDispatcher::channel(16);
    // the receiver is leaked so the queue stays open for the test's lifetime
    std::mem::forget(rx);
    let state = AppState::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &rails,
        dispatcher,
        None,
    )
    .unwrap();
    (api::router(state), store)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn purchase(order_id: Uuid, payment_method: &str, currency: &str) -> Value {
    json!({
        "merchantId": 1,
        "merchantPassword": "demo",
        "merchantOrderId": order_id,
        "amount": 100.0,
        "currency": currency,
        "paymentMethod": payment_method,
        "merchantTimestamp": Utc::now(),
    })
}

#[tokio::test]
async fn paypal_start_returns_approval_url() {
    let paypal = MockServer::start().await;
    let order_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/payment"))
        .and(body_partial_json(json!({
            "merchantOrderId": order_id,
            "merchantId": 1,
            "currency": "EUR",
            "description": format!("Order {}", order_id),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentId": "PAY-42",
            "paypalOrderId": "5O190127TN364715T",
            "approvalUrl": "https://paypal.example/approve?token=5O190127TN364715T",
            "status": "CREATED",
        })))
        .expect(1)
        .mount(&paypal)
        .await;

    let (app, store) = app_with(RailConfig {
        paypal_service_url: format!("{}/payment", paypal.uri()),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });

    let (status, body) = call(&app, Method::POST, "/payment", Some(purchase(order_id, "PayPal", "eur"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["paymentURL"],
        "https://paypal.example/approve?token=5O190127TN364715T"
    );
    assert_eq!(body["token"], "PAY-42");

    let transaction = store
        .find_by_merchant_order_id(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body["tokenId"], json!(transaction.transaction_id));
}

#[tokio::test]
async fn reused_order_id_never_reaches_paypal() {
    let paypal = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentId": "PAY-7",
            "approvalUrl": "https://paypal.example/approve?token=EC-7",
        })))
        .expect(1)
        .mount(&paypal)
        .await;

    let (app, store) = app_with(RailConfig {
        paypal_service_url: format!("{}/payment", paypal.uri()),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });

    let order_id = Uuid::new_v4();
    let (status, _) = call(&app, Method::POST, "/payment", Some(purchase(order_id, "PayPal", "eur"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::POST, "/payment", Some(purchase(order_id, "PayPal", "eur"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DUPLICATE_TRANSACTION");

    assert_eq!(store.transaction_count().await, 1);
    paypal.verify().await;
}

#[tokio::test]
async fn paypal_failure_is_bad_gateway_and_keeps_transaction() {
    let paypal = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&paypal)
        .await;

    let (app, store) = app_with(RailConfig {
        paypal_service_url: paypal.uri(),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });
    let order_id = Uuid::new_v4();

    let (status, body) = call(&app, Method::POST, "/payment", Some(purchase(order_id, "paypal", "EUR"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "PAYMENT_RAIL_ERROR");

    let transaction = store
        .find_by_merchant_order_id(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::InProgress);
}

#[tokio::test]
async fn crypto_details_are_quoted_in_btc_and_relayed() {
    let crypto = MockServer::start().await;
    let order_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/payment"))
        .and(body_partial_json(json!({
            "merchantOrderId": order_id,
            "currency": "BTC",
            "merchantId": 1,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentId": "8c7c2c1e-9f6e-4d7b-9a55-0f5d0c6b8a11",
            "walletAddress": "bc1qexample",
            "amount": 0.001,
        })))
        .expect(1)
        .mount(&crypto)
        .await;

    let (app, _store) = app_with(RailConfig {
        crypto_service_url: crypto.uri(),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });

    let (status, start) = call(&app, Method::POST, "/payment", Some(purchase(order_id, "crypto", "USD"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(start["paymentURL"]
        .as_str()
        .unwrap()
        .contains(&format!("merchantOrderId={}", order_id)));

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/crypto-payment-details?merchantOrderId={}", order_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["walletAddress"], "bc1qexample");

    let requests = crypto.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let amount = sent["amount"].as_f64().unwrap();
    assert!((amount - 0.001).abs() < 1e-12);
}

#[tokio::test]
async fn crypto_status_is_relayed() {
    let crypto = MockServer::start().await;
    let payment_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(format!("/payment-status/{}", payment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentId": payment_id,
            "status": "CONFIRMED",
        })))
        .mount(&crypto)
        .await;

    let (app, _store) = app_with(RailConfig {
        crypto_service_url: crypto.uri(),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/crypto-status?paymentId={}", payment_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONFIRMED");

    let (status, _) = call(&app, Method::GET, "/crypto-status?paymentId=not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unreachable_crypto_service_is_unavailable() {
    let (app, _store) = app_with(RailConfig {
        crypto_service_url: "http://127.0.0.1:9".to_string(),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });
    let order_id = Uuid::new_v4();
    call(&app, Method::POST, "/payment", Some(purchase(order_id, "crypto", "RSD"))).await;

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/crypto-payment-details?merchantOrderId={}", order_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "EXTERNAL_SERVICE_UNAVAILABLE");

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/crypto-payment-details?merchantOrderId={}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn qr_registry_rejection_is_bad_gateway() {
    let nbs = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "s": {"code": 1, "desc": "Neispravan QR kod"},
            "t": "",
            "n": {}
        })))
        .mount(&nbs)
        .await;

    let (app, _store) = app_with(RailConfig {
        nbs_upload_url: nbs.uri(),
        outbound_timeout: Duration::from_secs(2),
        ..RailConfig::default()
    });

    let boundary = "nbs";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"qr.png\"\r\nContent-Type: image/png\r\n\r\nPNG\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"CardNumber\"\r\n\r\n4111111111111111\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"ExpDate\"\r\n\r\n01/30\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/qr-scan")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
