use crate::payments::error::PaymentResult;
use crate::payments::types::WebshopNotification;
use crate::payments::utils::PaymentHttpClient;
use tracing::{info, warn};

/// Pushes final payment outcomes to the webshop
pub struct WebshopNotifier {
    url: String,
    http: PaymentHttpClient,
}

impl WebshopNotifier {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> PaymentResult<Self> {
        Ok(Self {
            url: url.into(),
            http: PaymentHttpClient::new("webshop", timeout)?,
        })
    }

    pub async fn send_notification(&self, notification: &WebshopNotification) -> PaymentResult<()> {
        match self.http.post_json_discard(&self.url, notification).await {
            Ok(()) => {
                info!(
                    merchant_order_id = %notification.merchant_order_id,
                    redirect_url = %notification.url,
                    "🔔 Webshop notified of payment outcome"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    merchant_order_id = %notification.merchant_order_id,
                    error = %e,
                    "Webshop notification failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_url_and_order_id() {
        let server = MockServer::start().await;
        let order_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/purchase-status"))
            .and(body_json(json!({
                "url": "http://shop/success",
                "merchantOrderId": order_id,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebshopNotifier::new(
            format!("{}/purchase-status", server.uri()),
            std::time::Duration::from_secs(2),
        )
        .unwrap();
        notifier
            .send_notification(&WebshopNotification {
                url: "http://shop/success".to_string(),
                merchant_order_id: order_id,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webshop_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier =
            WebshopNotifier::new(server.uri(), std::time::Duration::from_secs(2)).unwrap();
        let result = notifier
            .send_notification(&WebshopNotification {
                url: String::new(),
                merchant_order_id: Uuid::new_v4(),
            })
            .await;
        assert!(result.is_err());
    }
}
