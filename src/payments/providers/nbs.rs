use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::NbsUploadResponse;
use crate::payments::utils::PaymentHttpClient;
use reqwest::multipart::{Form, Part};
use tracing::debug;

/// QR image uploaded by the shopper's bank app
#[derive(Debug, Clone)]
pub struct QrImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Client for the NBS IPS QR decoding API
pub struct QrRegistryClient {
    upload_url: String,
    http: PaymentHttpClient,
}

impl QrRegistryClient {
    pub fn new(upload_url: impl Into<String>, timeout: std::time::Duration) -> PaymentResult<Self> {
        Ok(Self {
            upload_url: upload_url.into(),
            http: PaymentHttpClient::new("nbs", timeout)?,
        })
    }

    /// Decode the image and return the payment reference (`RO`) it carries
    pub async fn decode_reference(&self, image: QrImage) -> PaymentResult<u64> {
        let response = self.upload(image).await?;
        let reference = response.n.RO.trim();
        debug!(raw = %response.t, reference, "QR code decoded");

        reference
            .parse::<u64>()
            .map_err(|_| PaymentError::ValidationError {
                message: format!("QR code reference '{}' is not a number", reference),
                field: Some("RO".to_string()),
            })
    }

    pub async fn upload(&self, image: QrImage) -> PaymentResult<NbsUploadResponse> {
        let mut part = Part::bytes(image.bytes).file_name(image.file_name);
        if let Some(content_type) = image.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| PaymentError::ValidationError {
                    message: format!("invalid content type: {}", e),
                    field: Some("file".to_string()),
                })?;
        }
        let form = Form::new().part("file", part);

        let response: NbsUploadResponse = self.http.post_multipart(&self.upload_url, form).await?;
        if response.s.code != 0 {
            return Err(PaymentError::QrRegistryRejected {
                code: response.s.code,
                description: response.s.desc,
            });
        }
        Ok(response)
    }
}
