//! HTTP surface of the orchestrator

pub mod callbacks;
pub mod crypto;
pub mod payments;
pub mod subscriptions;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::RailConfig;
use crate::database::repository::{MerchantDirectory, SubscriptionStore, TransactionLedger};
use crate::error::{AppError, ValidationError};
use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::middleware::auth::merchant_auth_middleware;
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::error::PaymentResult;
use crate::payments::factory::PaymentRailFactory;
use crate::payments::providers::{CryptoServiceClient, QrRegistryClient};
use crate::services::{
    CallbackProcessor, OutboundDispatcher, PaymentOrchestrator, SubscriptionService,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub callbacks: Arc<CallbackProcessor>,
    pub subscriptions: Arc<SubscriptionService>,
    pub merchants: Arc<dyn MerchantDirectory>,
    pub health_checker: HealthChecker,
}

impl AppState {
    /// Wire the services over the given stores and the configured rails
    pub fn new(
        merchants: Arc<dyn MerchantDirectory>,
        ledger: Arc<dyn TransactionLedger>,
        subscriptions: Arc<dyn SubscriptionStore>,
        rails: &RailConfig,
        dispatcher: OutboundDispatcher,
        db_pool: Option<sqlx::PgPool>,
    ) -> PaymentResult<Self> {
        let orchestrator = PaymentOrchestrator::new(
            merchants.clone(),
            ledger.clone(),
            PaymentRailFactory::from_config(rails)?,
            dispatcher.clone(),
            Arc::new(CryptoServiceClient::new(
                &rails.crypto_service_url,
                rails.outbound_timeout,
            )?),
            Arc::new(QrRegistryClient::new(
                &rails.nbs_upload_url,
                rails.outbound_timeout,
            )?),
        );
        let callbacks = CallbackProcessor::new(merchants.clone(), ledger, dispatcher.clone());
        let subscription_service = SubscriptionService::new(
            merchants.clone(),
            subscriptions,
            &rails.subscription_page_url,
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            callbacks: Arc::new(callbacks),
            subscriptions: Arc::new(subscription_service),
            merchants,
            health_checker: HealthChecker::new(db_pool, dispatcher),
        })
    }
}

/// All routes. Administrative routes sit behind the merchant auth middleware.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/subscription", post(subscriptions::replace_subscriptions))
        .route(
            "/subscription/{merchantId}",
            get(subscriptions::list_subscriptions),
        )
        .route("/merchants", get(subscriptions::list_merchants))
        .layer(axum::middleware::from_fn_with_state(
            state.merchants.clone(),
            merchant_auth_middleware,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/payment", post(payments::initiate_payment))
        .route("/card-details", post(payments::submit_card_details))
        .route("/qr-scan", post(payments::submit_qr_scan))
        .route("/transaction-status", post(payments::transaction_status))
        .route("/payment-callback", put(callbacks::payment_callback))
        .route(
            "/crypto-payment-details",
            get(crypto::crypto_payment_details),
        )
        .route("/crypto-status", get(crypto::crypto_payment_status))
        .route("/subscription/url", post(subscriptions::subscription_url))
        .merge(admin)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    info!("📍 Root endpoint accessed");
    Json(serde_json::json!({ "message": "Hello World" }))
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health_checker.check_health().await;

    if health_status.status == HealthState::Unhealthy {
        error!("❌ Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    } else {
        Ok(Json(health_status))
    }
}

/// Attach the caller's request id to an error on its way out
pub(crate) fn tag_request_id(headers: &HeaderMap) -> impl Fn(AppError) -> AppError + '_ {
    move |err| match get_request_id_from_headers(headers) {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}

/// Unwrap a JSON body, turning a malformed or mistyped one into a 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        AppError::validation(ValidationError::InvalidFormat {
            field: "body".to_string(),
            reason: rejection.body_text(),
        })
    })
}
