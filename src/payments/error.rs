use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    /// The downstream service could not be reached at all
    #[error("Network error: service={service}, message={message}")]
    NetworkError { service: String, message: String },

    #[error("Timeout: service={service} after {timeout_secs}s")]
    TimeoutError { service: String, timeout_secs: u64 },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    /// The QR registry answered but refused to decode the image
    #[error("QR registry rejected upload: code={code}, description={description}")]
    QrRegistryRejected { code: i64, description: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::TimeoutError { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::QrRegistryRejected { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::TimeoutError { .. } => 504,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::QrRegistryRejected { .. } => 502,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::NetworkError { service, .. } => {
                format!("{} service unavailable", service)
            }
            PaymentError::TimeoutError { service, .. } => {
                format!("{} service timed out", service)
            }
            PaymentError::ProviderError { .. } => "Payment provider returned an error".to_string(),
            PaymentError::QrRegistryRejected { description, .. } => {
                format!("QR code could not be read: {}", description)
            }
        }
    }

    /// Name of the downstream service the error came from, if any
    pub fn service(&self) -> Option<&str> {
        match self {
            PaymentError::ValidationError { .. } => None,
            PaymentError::NetworkError { service, .. } => Some(service),
            PaymentError::TimeoutError { service, .. } => Some(service),
            PaymentError::ProviderError { provider, .. } => Some(provider),
            PaymentError::QrRegistryRejected { .. } => Some("nbs"),
        }
    }

    /// Collapse any failure into a rail error (502). Used where the caller's
    /// contract reports every rail problem as a bad gateway.
    pub fn into_rail_error(self, rail: &str) -> crate::error::AppError {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        match self {
            PaymentError::ValidationError { .. } => self.into(),
            other => AppError::new(AppErrorKind::External(ExternalError::PaymentRail {
                rail: rail.to_string(),
                message: other.to_string(),
                is_retryable: other.is_retryable(),
            })),
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match err {
            PaymentError::ValidationError { message, field } => {
                AppError::validation(ValidationError::InvalidFormat {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            PaymentError::NetworkError { service, message } => {
                AppError::new(AppErrorKind::External(ExternalError::Unavailable {
                    service,
                    message,
                }))
            }
            PaymentError::TimeoutError {
                service,
                timeout_secs,
            } => AppError::new(AppErrorKind::External(ExternalError::Timeout {
                service,
                timeout_secs,
            })),
            PaymentError::ProviderError {
                provider,
                message,
                retryable,
                ..
            } => AppError::new(AppErrorKind::External(ExternalError::PaymentRail {
                rail: provider,
                message,
                is_retryable: retryable,
            })),
            PaymentError::QrRegistryRejected { code, description } => {
                AppError::new(AppErrorKind::External(ExternalError::PaymentRail {
                    rail: "nbs".to_string(),
                    message: format!("code {}: {}", code, description),
                    is_retryable: false,
                }))
            }
        }
    }
}
