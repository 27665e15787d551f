use crate::database::transaction_repository::Transaction;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentRail;
use crate::payments::types::{PaymentMethod, PaymentStartResponse};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

/// Card and QR tokens live for 15 minutes
pub const CARD_TOKEN_TTL_MINUTES: i64 = 15;

/// Redirects the shopper to the card entry page. The card page later posts
/// the instrument to `/card-details`.
pub struct CardRail {
    page_url: String,
}

impl CardRail {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
        }
    }
}

#[async_trait]
impl PaymentRail for CardRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    async fn start_payment(&self, _transaction: &Transaction) -> PaymentResult<PaymentStartResponse> {
        let token_id = Uuid::new_v4();
        Ok(PaymentStartResponse {
            payment_url: format!("{}?tokenId={}", self.page_url, token_id),
            token_id,
            token: "token".to_string(),
            token_exp: Utc::now() + Duration::minutes(CARD_TOKEN_TTL_MINUTES),
            qr_ref: None,
        })
    }
}

/// Redirects the shopper to the QR page, which shows the IPS code carrying
/// the transaction's reference.
pub struct QrRail {
    page_url: String,
}

impl QrRail {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
        }
    }
}

#[async_trait]
impl PaymentRail for QrRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Qr
    }

    async fn start_payment(&self, transaction: &Transaction) -> PaymentResult<PaymentStartResponse> {
        let qr_ref = transaction
            .qr_ref
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!(
                    "QR transaction {} has no payment reference",
                    transaction.transaction_id
                ),
                field: Some("qrRef".to_string()),
            })?;

        let token_id = Uuid::new_v4();
        Ok(PaymentStartResponse {
            payment_url: format!("{}?tokenId={}", self.page_url, token_id),
            token_id,
            token: "token".to_string(),
            token_exp: Utc::now() + Duration::minutes(CARD_TOKEN_TTL_MINUTES),
            qr_ref: Some(qr_ref),
        })
    }
}
