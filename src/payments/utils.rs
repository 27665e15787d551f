use crate::middleware::logging::log_external_call;
use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::warn;

/// JSON/multipart HTTP client shared by every rail adapter.
///
/// POSTs are sent exactly once. Only idempotent GETs are retried.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    service: String,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(service: impl Into<String>, timeout: Duration) -> PaymentResult<Self> {
        let service = service.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::NetworkError {
                service: service.clone(),
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            service,
            timeout,
            max_retries: 0,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> PaymentResult<T> {
        let text = self.execute(url, self.client.post(url).json(body)).await?;
        self.decode(&text)
    }

    /// POST where only the status matters; the response body is discarded.
    pub async fn post_json_discard<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> PaymentResult<()> {
        self.execute(url, self.client.post(url).json(body))
            .await
            .map(|_| ())
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        url: &str,
        form: reqwest::multipart::Form,
    ) -> PaymentResult<T> {
        let text = self
            .execute(url, self.client.post(url).multipart(form))
            .await?;
        self.decode(&text)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> PaymentResult<T> {
        let mut attempt = 0;
        loop {
            match self.execute(url, self.client.get(url)).await {
                Ok(text) => return self.decode(&text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        service = %self.service,
                        attempt,
                        error = %e,
                        "idempotent request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(200 << attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(&self, url: &str, request: RequestBuilder) -> PaymentResult<String> {
        let started = Instant::now();
        let response = match request.timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                log_external_call(&self.service, url, None, started.elapsed());
                return Err(self.classify(e));
            }
        };

        let status = response.status();
        log_external_call(&self.service, url, Some(status.as_u16()), started.elapsed());
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok(text);
        }

        Err(PaymentError::ProviderError {
            provider: self.service.clone(),
            message: format!("HTTP {}: {}", status, text),
            provider_code: Some(status.as_u16().to_string()),
            retryable: status.is_server_error(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> PaymentResult<T> {
        serde_json::from_str::<T>(text).map_err(|e| PaymentError::ProviderError {
            provider: self.service.clone(),
            message: format!("invalid JSON response: {}", e),
            provider_code: None,
            retryable: false,
        })
    }

    fn classify(&self, error: reqwest::Error) -> PaymentError {
        if error.is_timeout() {
            PaymentError::TimeoutError {
                service: self.service.clone(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            PaymentError::NetworkError {
                service: self.service.clone(),
                message: format!("request failed: {}", root_cause(&error)),
            }
        }
    }
}

fn root_cause(error: &reqwest::Error) -> String {
    let mut source: &dyn std::error::Error = error;
    while let Some(next) = source.source() {
        source = next;
    }
    source.to_string()
}

/// Lowercase hex SHA-512 of `input`
pub fn sha512_hex(input: &str) -> String {
    use sha2::{Digest, Sha512};

    hex::encode(Sha512::digest(input.as_bytes()))
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn sha512_hex_matches_known_digest() {
        assert_eq!(
            sha512_hex("abc"),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[tokio::test]
    async fn post_json_decodes_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = PaymentHttpClient::new("test", Duration::from_secs(2)).unwrap();
        let body: Value = client
            .post_json(&format!("{}/payment", server.uri()), &json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn post_is_not_retried_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = PaymentHttpClient::new("test", Duration::from_secs(2))
            .unwrap()
            .with_max_retries(3);
        let result: PaymentResult<Value> = client.post_json(&server.uri(), &json!({})).await;
        match result {
            Err(PaymentError::ProviderError { provider_code, .. }) => {
                assert_eq!(provider_code.as_deref(), Some("500"))
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn get_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let client = PaymentHttpClient::new("test", Duration::from_secs(2))
            .unwrap()
            .with_max_retries(1);
        let result: PaymentResult<Value> = client.get_json(&server.uri()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_service_is_network_error() {
        let client = PaymentHttpClient::new("test", Duration::from_secs(2)).unwrap();
        let result: PaymentResult<Value> = client
            .post_json("http://127.0.0.1:1/payment", &json!({}))
            .await;
        assert!(matches!(result, Err(PaymentError::NetworkError { .. })));
    }
}
