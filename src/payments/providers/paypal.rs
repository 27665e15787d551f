use crate::database::transaction_repository::Transaction;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentRail;
use crate::payments::types::{PaymentMethod, PaymentStartResponse};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const PAYPAL_TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub service_url: String,
    pub timeout: std::time::Duration,
}

/// Order creation request understood by the PayPal service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalPaymentRequest {
    pub transaction_id: Uuid,
    pub merchant_order_id: Uuid,
    pub merchant_id: i64,
    pub amount: f64,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalPaymentResponse {
    pub payment_id: String,
    #[serde(rename = "paypalOrderId", default)]
    pub paypal_order_id: String,
    pub approval_url: String,
    #[serde(default)]
    pub status: String,
}

/// Creates the PayPal order synchronously and redirects the shopper to its
/// approval page. Capture is reported later through the payment callback.
pub struct PayPalRail {
    config: PayPalConfig,
    http: PaymentHttpClient,
}

impl PayPalRail {
    pub fn new(config: PayPalConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new("paypal", config.timeout)?;
        Ok(Self { config, http })
    }

    fn build_request(transaction: &Transaction) -> PayPalPaymentRequest {
        PayPalPaymentRequest {
            transaction_id: transaction.transaction_id,
            merchant_order_id: transaction.merchant_order_id,
            merchant_id: transaction.merchant_id,
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            description: format!("Order {}", transaction.merchant_order_id),
        }
    }
}

#[async_trait]
impl PaymentRail for PayPalRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    async fn start_payment(&self, transaction: &Transaction) -> PaymentResult<PaymentStartResponse> {
        let request = Self::build_request(transaction);
        let response: PayPalPaymentResponse =
            self.http.post_json(&self.config.service_url, &request).await?;

        if response.approval_url.trim().is_empty() {
            return Err(PaymentError::ProviderError {
                provider: "paypal".to_string(),
                message: "response carried no approval URL".to_string(),
                provider_code: None,
                retryable: false,
            });
        }

        info!(
            transaction_id = %transaction.transaction_id,
            payment_id = %response.payment_id,
            paypal_order_id = %response.paypal_order_id,
            status = %response.status,
            "PayPal order created"
        );

        Ok(PaymentStartResponse {
            payment_url: response.approval_url,
            token_id: transaction.transaction_id,
            token: response.payment_id,
            token_exp: Utc::now() + Duration::minutes(PAYPAL_TOKEN_TTL_MINUTES),
            qr_ref: None,
        })
    }
}
