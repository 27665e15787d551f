//! End-to-end flows through the HTTP router on the in-memory store
//!
//! Tests cover:
//! - Purchase initiation for the card and QR rails
//! - Card details and QR scans forwarded to the bank gateway queue
//! - Callback reconciliation and webshop notification
//! - Merchant authorization and subscription administration

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use psp_orchestrator::api::{self, AppState};
use psp_orchestrator::config::RailConfig;
use psp_orchestrator::database::in_memory::InMemoryStore;
use psp_orchestrator::database::repository::{MerchantDirectory, TransactionLedger};
use psp_orchestrator::middleware::logging::{request_logging_middleware, UuidRequestId};
use psp_orchestrator::payments::types::{PaymentMethod, TransactionStatus};
use psp_orchestrator::services::{OutboundDispatcher, OutboundJob};

struct TestApp {
    app: Router,
    store: Arc<InMemoryStore>,
    jobs: mpsc::Receiver<OutboundJob>,
}

fn test_app(rails: RailConfig) -> TestApp {
    let store = Arc::new(InMemoryStore::demo());
    let (dispatcher, jobs) = OutboundDispatcher::channel(16);
    let state = AppState::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &rails,
        dispatcher,
        None,
    )
    .unwrap();

    TestApp {
        app: api::router(state),
        store,
        jobs,
    }
}

fn rails() -> RailConfig {
    RailConfig {
        outbound_timeout: std::time::Duration::from_secs(2),
        ..RailConfig::default()
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
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
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn purchase(order_id: Uuid, payment_method: &str) -> Value {
    json!({
        "merchantId": 1,
        "merchantPassword": "demo",
        "merchantOrderId": order_id,
        "amount": 2500.0,
        "currency": "rsd",
        "paymentMethod": payment_method,
        "merchantTimestamp": Utc::now(),
    })
}

fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                    name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[tokio::test]
async fn card_payment_end_to_end() {
    let mut t = test_app(rails());
    let order_id = Uuid::new_v4();

    let (status, start) = send(&t.app, Method::POST, "/payment", Some(purchase(order_id, "card"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(start["paymentURL"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:3001/card?tokenId="));
    assert_eq!(start["token"], "token");
    assert!(start.get("qrRef").is_none());

    let transaction = t
        .store
        .find_by_merchant_order_id(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::InProgress);
    assert_eq!(transaction.payment_method, PaymentMethod::Card);
    assert!(transaction.qr_ref.is_none());

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/card-details",
        Some(json!({
            "cardNumber": "4111 1111 1111 1111",
            "merchantOrderId": order_id,
            "expDate": "12/29",
            "cardVerificationCode": 123,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment request forwarded");

    match t.jobs.recv().await {
        Some(OutboundJob::BankPayment(request)) => {
            assert_eq!(request.transaction_id, transaction.transaction_id);
            assert_eq!(request.card_number, "4111111111111111");
            assert_eq!(request.amount, 2500.0);
            assert_eq!(request.currency, "RSD");
        }
        other => panic!("expected bank payment, got {:?}", other),
    }

    let (status, body) = send(
        &t.app,
        Method::PUT,
        "/payment-callback",
        Some(json!({
            "acquirerOrderId": Uuid::new_v4(),
            "acquirerTimestamp": Utc::now(),
            "merchantOrderId": order_id,
            "transactionId": transaction.transaction_id,
            "status": 0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment response forwarded");

    match t.jobs.recv().await {
        Some(OutboundJob::WebshopNotification(notification)) => {
            assert_eq!(notification.url, "http://localhost:3000/success");
            assert_eq!(notification.merchant_order_id, order_id);
        }
        other => panic!("expected webshop notification, got {:?}", other),
    }

    let stored = t
        .store
        .find_by_id(transaction.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Successful);

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/transaction-status",
        Some(json!({ "merchantOrderId": order_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "http://localhost:3000/success");
}

#[tokio::test]
async fn qr_payment_end_to_end() {
    let nbs = MockServer::start().await;
    let mut t = test_app(RailConfig {
        nbs_upload_url: format!("{}/upload", nbs.uri()),
        ..rails()
    });
    let order_id = Uuid::new_v4();

    let (status, start) = send(&t.app, Method::POST, "/payment", Some(purchase(order_id, "qr"))).await;
    assert_eq!(status, StatusCode::OK);
    let qr_ref = start["qrRef"].as_u64().unwrap();
    assert!(qr_ref > 0);

    let by_ref = t.store.find_by_qr_ref(qr_ref).await.unwrap().unwrap();
    assert_eq!(by_ref.merchant_order_id, order_id);

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "s": {"code": 0, "desc": "OK"},
            "t": format!("K:PR|RO:{}", qr_ref),
            "n": {"K": "PR", "RO": qr_ref.to_string()}
        })))
        .expect(1)
        .mount(&nbs)
        .await;

    let boundary = "qrboundary";
    let body = multipart_body(
        boundary,
        &[
            ("file", Some("qr.png"), &[0x89u8, 0x50, 0x4e, 0x47][..]),
            ("CardNumber", None, &b"5555555555554444"[..]),
            ("ExpDate", None, &b"07/28"[..]),
        ],
    );
    let response = t
        .app
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
    assert_eq!(response.status(), StatusCode::OK);

    match t.jobs.recv().await {
        Some(OutboundJob::BankPayment(request)) => {
            assert_eq!(request.merchant_order_id, order_id);
            assert_eq!(request.card_number, "5555555555554444");
            assert_eq!(request.exp_date.to_rfc3339(), "2028-07-01T00:00:00+00:00");
        }
        other => panic!("expected bank payment, got {:?}", other),
    }
}

#[tokio::test]
async fn qr_scan_without_expiry_is_rejected() {
    let t = test_app(rails());
    let boundary = "qrboundary";
    let body = multipart_body(
        boundary,
        &[
            ("file", Some("qr.png"), &[0x89u8][..]),
            ("CardNumber", None, &b"5555555555554444"[..]),
        ],
    );
    let response = t
        .app
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
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_for_unknown_transaction_is_not_found() {
    let mut t = test_app(rails());

    let (status, body) = send(
        &t.app,
        Method::PUT,
        "/payment-callback",
        Some(json!({
            "merchantOrderId": Uuid::new_v4(),
            "transactionId": Uuid::new_v4(),
            "status": "Failed",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "TRANSACTION_NOT_FOUND");
    assert_eq!(t.store.transaction_count().await, 0);
    assert!(t.jobs.try_recv().is_err());
}

#[tokio::test]
async fn second_callback_is_rejected_without_notification() {
    let mut t = test_app(rails());
    let order_id = Uuid::new_v4();
    send(&t.app, Method::POST, "/payment", Some(purchase(order_id, "card"))).await;
    let transaction = t
        .store
        .find_by_merchant_order_id(order_id)
        .await
        .unwrap()
        .unwrap();

    let callback = |status: u8| {
        json!({
            "merchantOrderId": order_id,
            "transactionId": transaction.transaction_id,
            "status": status,
        })
    };

    let (status, _) = send(&t.app, Method::PUT, "/payment-callback", Some(callback(2))).await;
    assert_eq!(status, StatusCode::OK);
    match t.jobs.recv().await {
        Some(OutboundJob::WebshopNotification(notification)) => {
            assert_eq!(notification.url, "http://localhost:3000/fail")
        }
        other => panic!("expected webshop notification, got {:?}", other),
    }

    let (status, body) = send(&t.app, Method::PUT, "/payment-callback", Some(callback(0))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "TRANSACTION_ALREADY_FINALIZED");
    assert!(t.jobs.try_recv().is_err());

    let stored = t
        .store
        .find_by_id(transaction.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_callbacks_finalize_once() {
    let mut t = test_app(rails());
    let order_id = Uuid::new_v4();
    send(&t.app, Method::POST, "/payment", Some(purchase(order_id, "card"))).await;
    let transaction = t
        .store
        .find_by_merchant_order_id(order_id)
        .await
        .unwrap()
        .unwrap();

    let callback = |status: u8| {
        json!({
            "merchantOrderId": order_id,
            "transactionId": transaction.transaction_id,
            "status": status,
        })
    };

    let (successful, failed) = tokio::join!(
        send(&t.app, Method::PUT, "/payment-callback", Some(callback(0))),
        send(&t.app, Method::PUT, "/payment-callback", Some(callback(2))),
    );
    let mut statuses = vec![successful.0, failed.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let expected_url = if successful.0 == StatusCode::OK {
        "http://localhost:3000/success"
    } else {
        "http://localhost:3000/fail"
    };
    match t.jobs.try_recv() {
        Ok(OutboundJob::WebshopNotification(notification)) => {
            assert_eq!(notification.url, expected_url)
        }
        other => panic!("expected one webshop notification, got {:?}", other),
    }
    assert!(t.jobs.try_recv().is_err());

    let stored = t
        .store
        .find_by_id(transaction.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.status.is_terminal());
}

#[tokio::test]
async fn in_progress_callback_status_is_rejected() {
    let t = test_app(rails());
    let (status, body) = send(
        &t.app,
        Method::PUT,
        "/payment-callback",
        Some(json!({
            "merchantOrderId": Uuid::new_v4(),
            "transactionId": Uuid::new_v4(),
            "status": 1,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn purchase_validation_and_authorization() {
    let t = test_app(RailConfig {
        enabled_methods: vec![PaymentMethod::Card, PaymentMethod::Qr],
        ..rails()
    });

    let mut bad_amount = purchase(Uuid::new_v4(), "card");
    bad_amount["amount"] = json!(-5);
    let (status, _) = send(&t.app, Method::POST, "/payment", Some(bad_amount)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/payment",
        Some(purchase(Uuid::new_v4(), "paypal")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "PAYMENT_METHOD_DISABLED");

    let mut wrong_password = purchase(Uuid::new_v4(), "card");
    wrong_password["merchantPassword"] = json!("guess");
    let (status, body) = send(&t.app, Method::POST, "/payment", Some(wrong_password)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_MERCHANT_CREDENTIALS");

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/payment")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(t.store.transaction_count().await, 0);
}

#[tokio::test]
async fn duplicate_merchant_order_id_conflicts() {
    let t = test_app(rails());
    let order_id = Uuid::new_v4();

    let (first, _) = send(&t.app, Method::POST, "/payment", Some(purchase(order_id, "card"))).await;
    let (second, body) = send(&t.app, Method::POST, "/payment", Some(purchase(order_id, "crypto"))).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DUPLICATE_TRANSACTION");
    assert_eq!(t.store.transaction_count().await, 1);
}

#[tokio::test]
async fn merchant_checks_and_redirects() {
    let t = test_app(rails());

    assert!(t.store.check_merchant(1, "demo").await.unwrap().is_some());
    assert!(t.store.check_merchant(1, "wrong").await.unwrap().is_none());
    assert!(t.store.check_merchant(404, "demo").await.unwrap().is_none());

    for (status, expected) in [
        (TransactionStatus::Successful, Some("http://localhost:3000/success")),
        (TransactionStatus::Failed, Some("http://localhost:3000/fail")),
        (TransactionStatus::Error, Some("http://localhost:3000/error")),
        (TransactionStatus::InProgress, None),
    ] {
        let first = t.store.redirect_url(1, status).await.unwrap();
        let second = t.store.redirect_url(1, status).await.unwrap();
        assert_eq!(first.as_deref(), expected);
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn subscription_administration_requires_auth() {
    let t = test_app(rails());

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/subscription/url",
        Some(json!({ "merchantId": 1, "merchantPassword": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "http://localhost:3001/subscription?merchantId=1");

    let (status, _) = send(&t.app, Method::GET, "/merchants", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authed = |method: Method, uri: &str, body: Option<Value>| {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Merchant-Username", "demo")
            .header("X-Merchant-Password", "demo");
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap()
    };

    let response = t
        .app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/subscription",
            Some(json!({ "merchantId": 1, "merchantPassword": "demo", "methods": [0, 3] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"null");

    let response = t
        .app
        .clone()
        .oneshot(authed(Method::GET, "/subscription/1", None))
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let codes: Vec<i64> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(codes, vec![0, 3]);

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/merchants")
                .header(header::AUTHORIZATION, "Bearer session-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let usernames: Vec<String> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(usernames, vec!["demo".to_string()]);
}

#[tokio::test]
async fn root_health_and_request_id() {
    let t = test_app(rails());
    let app = t.app.clone().layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let (status, body) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Hello World");

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Degraded");
    assert_eq!(body["checks"]["dispatcher"]["status"], "Up");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/transaction-status")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-request-id", "req-123")
                .body(Body::from(json!({ "merchantOrderId": Uuid::new_v4() }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-123");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["request_id"], "req-123");
}
