use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, State},
    http::HeaderMap,
    Json,
};
use tracing::{info, warn};

use crate::api::{json_body, tag_request_id, AppState};
use crate::error::{AppError, ValidationError};
use crate::logging::mask_card_number;
use crate::payments::providers::QrImage;
use crate::payments::types::{
    CardDetailsRequest, MessageResponse, PaymentStartResponse, TransactionStatusRequest,
    TransactionStatusResponse, WebShopPaymentRequest,
};

/// POST /payment
pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<WebShopPaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentStartResponse>, AppError> {
    let request = json_body(payload).map_err(tag_request_id(&headers))?;
    info!(
        merchant_id = request.merchant_id,
        merchant_order_id = %request.merchant_order_id,
        payment_method = %request.payment_method,
        amount = request.amount,
        "🛒 Purchase request received"
    );

    state
        .orchestrator
        .initiate(request)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

/// POST /card-details
pub async fn submit_card_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CardDetailsRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let request = json_body(payload).map_err(tag_request_id(&headers))?;
    info!(
        merchant_order_id = %request.merchant_order_id,
        card = %mask_card_number(&request.card_number),
        "Card details received"
    );

    state
        .orchestrator
        .submit_card_details(request)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

/// POST /qr-scan, multipart with `file`, `CardNumber` and `ExpDate`
pub async fn submit_qr_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let tag = tag_request_id(&headers);
    let mut multipart = multipart.map_err(|e| tag(invalid_form(e.body_text())))?;

    let mut image: Option<QrImage> = None;
    let mut card_number: Option<String> = None;
    let mut exp_date: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| tag(invalid_form(e.body_text())))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("qr").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| tag(invalid_form(e.body_text())))?;
                image = Some(QrImage {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("CardNumber") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| tag(invalid_form(e.body_text())))?;
                card_number = Some(text);
            }
            Some("ExpDate") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| tag(invalid_form(e.body_text())))?;
                exp_date = Some(text);
            }
            other => {
                warn!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    let image = image.ok_or_else(|| tag(missing("file")))?;
    let card_number = card_number.ok_or_else(|| tag(missing("CardNumber")))?;
    let exp_date = exp_date.ok_or_else(|| tag(missing("ExpDate")))?;

    info!(
        file = %image.file_name,
        size = image.bytes.len(),
        card = %mask_card_number(&card_number),
        "📷 QR scan received"
    );

    state
        .orchestrator
        .submit_qr_scan(image, &card_number, exp_date.trim())
        .await
        .map(Json)
        .map_err(tag)
}

/// POST /transaction-status
pub async fn transaction_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransactionStatusRequest>, JsonRejection>,
) -> Result<Json<TransactionStatusResponse>, AppError> {
    let request = json_body(payload).map_err(tag_request_id(&headers))?;

    state
        .orchestrator
        .transaction_status_url(request.merchant_order_id)
        .await
        .map(Json)
        .map_err(tag_request_id(&headers))
}

fn invalid_form(reason: String) -> AppError {
    AppError::validation(ValidationError::InvalidFormat {
        field: "form".to_string(),
        reason,
    })
}

fn missing(field: &str) -> AppError {
    AppError::validation(ValidationError::MissingField {
        field: field.to_string(),
    })
}
