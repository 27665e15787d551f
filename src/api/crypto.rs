use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::{tag_request_id, AppState};
use crate::error::{AppError, ValidationError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoDetailsQuery {
    pub merchant_order_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoStatusQuery {
    pub payment_id: Uuid,
}

/// GET /crypto-payment-details?merchantOrderId=
pub async fn crypto_payment_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CryptoDetailsQuery>, QueryRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let Query(query) =
        query.map_err(|e| tag_request_id(&headers)(invalid_query("merchantOrderId", e)))?;

    state
        .orchestrator
        .crypto_payment_details(query.merchant_order_id)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

/// GET /crypto-status?paymentId=
pub async fn crypto_payment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CryptoStatusQuery>, QueryRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let Query(query) =
        query.map_err(|e| tag_request_id(&headers)(invalid_query("paymentId", e)))?;

    state
        .orchestrator
        .crypto_payment_status(query.payment_id)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

fn invalid_query(field: &str, rejection: QueryRejection) -> AppError {
    AppError::validation(ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: rejection.body_text(),
    })
}
