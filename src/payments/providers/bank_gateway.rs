use crate::payments::error::PaymentResult;
use crate::payments::types::BankPaymentRequest;
use crate::payments::utils::PaymentHttpClient;

/// Forwards card instruments to the bank gateway. The gateway answers the
/// payment asynchronously through the payment callback.
pub struct BankGatewayClient {
    url: String,
    http: PaymentHttpClient,
}

impl BankGatewayClient {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> PaymentResult<Self> {
        Ok(Self {
            url: url.into(),
            http: PaymentHttpClient::new("bank_gateway", timeout)?,
        })
    }

    pub async fn submit(&self, request: &BankPaymentRequest) -> PaymentResult<()> {
        self.http.post_json_discard(&self.url, request).await
    }
}
