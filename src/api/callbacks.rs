use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::api::{json_body, tag_request_id, AppState};
use crate::error::AppError;
use crate::payments::types::{MessageResponse, TransactionResponse};

/// PUT /payment-callback, the final status from any rail
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransactionResponse>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let callback = json_body(payload).map_err(tag_request_id(&headers))?;
    info!(
        transaction_id = %callback.transaction_id,
        merchant_order_id = %callback.merchant_order_id,
        status = %callback.status,
        "📨 Payment callback received"
    );

    state
        .callbacks
        .handle(callback)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}
