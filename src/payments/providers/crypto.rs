use crate::database::transaction_repository::Transaction;
use crate::payments::error::PaymentResult;
use crate::payments::provider::PaymentRail;
use crate::payments::types::{PaymentMethod, PaymentStartResponse};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRYPTO_TOKEN_TTL_MINUTES: i64 = 30;

/// Coin quoted to the shopper when the page does not choose one
pub const DEFAULT_CRYPTO_CURRENCY: &str = "BTC";

const FALLBACK_FIAT: &str = "RSD";

/// Static quote table: units of crypto per one unit of fiat
const RATES: &[(&str, &[(&str, f64)])] = &[
    ("RSD", &[("BTC", 0.000000095), ("ETH", 0.0000015), ("USDT", 0.0093)]),
    ("USD", &[("BTC", 0.000010), ("ETH", 0.00017), ("USDT", 1.0)]),
    ("EUR", &[("BTC", 0.000011), ("ETH", 0.00019), ("USDT", 1.08)]),
];

fn rate(fiat: &str, crypto: &str) -> Option<f64> {
    RATES
        .iter()
        .find(|(code, _)| *code == fiat)
        .and_then(|(_, row)| row.iter().find(|(coin, _)| *coin == crypto))
        .map(|(_, rate)| *rate)
}

/// Convert a fiat amount to `crypto_currency`.
///
/// Unknown fiat currencies are quoted with the RSD row; an unknown coin
/// converts to zero.
pub fn convert_to_crypto(fiat_amount: f64, fiat_currency: &str, crypto_currency: &str) -> f64 {
    let fiat = fiat_currency.trim().to_uppercase();
    let crypto = crypto_currency.trim().to_uppercase();
    let rate = rate(&fiat, &crypto)
        .or_else(|| rate(FALLBACK_FIAT, &crypto))
        .unwrap_or(0.0);
    fiat_amount * rate
}

/// Redirects the shopper to the crypto page, which pulls the quote from
/// `/crypto-payment-details`.
pub struct CryptoRail {
    page_url: String,
}

impl CryptoRail {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
        }
    }
}

#[async_trait]
impl PaymentRail for CryptoRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Crypto
    }

    async fn start_payment(&self, transaction: &Transaction) -> PaymentResult<PaymentStartResponse> {
        let token_id = Uuid::new_v4();
        Ok(PaymentStartResponse {
            payment_url: format!(
                "{}?merchantOrderId={}&tokenId={}",
                self.page_url, transaction.merchant_order_id, token_id
            ),
            token_id,
            token: "token".to_string(),
            token_exp: Utc::now() + Duration::minutes(CRYPTO_TOKEN_TTL_MINUTES),
            qr_ref: None,
        })
    }
}

/// Payment request understood by the crypto service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CryptoPaymentRequest {
    pub transaction_id: Uuid,
    pub merchant_order_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub merchant_id: i64,
}

impl CryptoPaymentRequest {
    /// Quote `transaction` in `crypto_currency`
    pub fn for_transaction(transaction: &Transaction, crypto_currency: &str) -> Self {
        Self {
            transaction_id: transaction.transaction_id,
            merchant_order_id: transaction.merchant_order_id,
            amount: convert_to_crypto(transaction.amount, &transaction.currency, crypto_currency),
            currency: crypto_currency.to_uppercase(),
            timestamp: transaction.timestamp,
            merchant_id: transaction.merchant_id,
        }
    }
}

/// Client for the crypto service. Bodies are relayed to the crypto page as-is.
pub struct CryptoServiceClient {
    base_url: String,
    http: PaymentHttpClient,
}

impl CryptoServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> PaymentResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: PaymentHttpClient::new("crypto", timeout)?.with_max_retries(1),
        })
    }

    pub async fn create_payment(&self, request: &CryptoPaymentRequest) -> PaymentResult<JsonValue> {
        self.http
            .post_json(&format!("{}/payment", self.base_url), request)
            .await
    }

    pub async fn payment_status(&self, payment_id: Uuid) -> PaymentResult<JsonValue> {
        self.http
            .get_json(&format!("{}/payment-status/{}", self.base_url, payment_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::PaymentError;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn conversion_uses_static_table() {
        assert!((convert_to_crypto(100.0, "USD", "BTC") - 0.001).abs() < 1e-12);
        assert!((convert_to_crypto(10.0, "eur", "usdt") - 10.8).abs() < 1e-9);
        assert!((convert_to_crypto(1_000_000.0, "RSD", "BTC") - 0.095).abs() < 1e-9);
    }

    #[test]
    fn unknown_fiat_falls_back_to_dinar_row() {
        assert_eq!(
            convert_to_crypto(1000.0, "JPY", "ETH"),
            convert_to_crypto(1000.0, "RSD", "ETH")
        );
    }

    #[test]
    fn unknown_coin_converts_to_zero() {
        assert_eq!(convert_to_crypto(1000.0, "USD", "DOGE"), 0.0);
    }

    #[tokio::test]
    async fn crypto_rail_points_page_at_order() {
        let now = Utc::now();
        let tx = Transaction::new_in_progress(2, Uuid::new_v4(), 50.0, "EUR", PaymentMethod::Crypto, now, now);
        let response = CryptoRail::new("http://localhost:3002/payment")
            .start_payment(&tx)
            .await
            .unwrap();

        assert_eq!(
            response.payment_url,
            format!(
                "http://localhost:3002/payment?merchantOrderId={}&tokenId={}",
                tx.merchant_order_id, response.token_id
            )
        );
        assert!(response.token_exp > Utc::now() + Duration::minutes(29));
    }

    #[tokio::test]
    async fn status_is_fetched_by_payment_id() {
        let server = MockServer::start().await;
        let payment_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/payment-status/{}", payment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
            .mount(&server)
            .await;

        let client = CryptoServiceClient::new(server.uri(), std::time::Duration::from_secs(2)).unwrap();
        let body = client.payment_status(payment_id).await.unwrap();
        assert_eq!(body["status"], "PENDING");
    }

    #[tokio::test]
    async fn unreachable_crypto_service_is_network_error() {
        let client =
            CryptoServiceClient::new("http://127.0.0.1:1", std::time::Duration::from_secs(1)).unwrap();
        let now = Utc::now();
        let tx = Transaction::new_in_progress(2, Uuid::new_v4(), 50.0, "EUR", PaymentMethod::Crypto, now, now);
        let err = client
            .create_payment(&CryptoPaymentRequest::for_transaction(&tx, DEFAULT_CRYPTO_CURRENCY))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NetworkError { .. }));
    }
}
