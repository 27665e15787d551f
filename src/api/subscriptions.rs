use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value as JsonValue;

use crate::api::{json_body, tag_request_id, AppState};
use crate::error::{AppError, ValidationError};
use crate::services::subscription::{
    SubscriptionRequest, SubscriptionUrlRequest, SubscriptionUrlResponse,
};

/// POST /subscription/url
pub async fn subscription_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SubscriptionUrlRequest>, JsonRejection>,
) -> Result<Json<SubscriptionUrlResponse>, AppError> {
    let request = json_body(payload).map_err(tag_request_id(&headers))?;

    state
        .subscriptions
        .subscription_url(&request)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

/// POST /subscription, answers `null` on success
pub async fn replace_subscriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let request = json_body(payload).map_err(tag_request_id(&headers))?;

    state
        .subscriptions
        .replace(&request)
        .await
        .map(|()| Json(JsonValue::Null))
        .map_err(tag_request_id(&headers))
}

/// GET /subscription/{merchantId}
pub async fn list_subscriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
    merchant_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<i16>>, AppError> {
    let Path(merchant_id) = merchant_id.map_err(|e| {
        tag_request_id(&headers)(AppError::validation(ValidationError::InvalidFormat {
            field: "merchantId".to_string(),
            reason: e.body_text(),
        }))
    })?;

    state
        .subscriptions
        .list(merchant_id)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

/// GET /merchants
pub async fn list_merchants(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, AppError> {
    state
        .subscriptions
        .list_merchants()
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}
