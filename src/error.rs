//! Error handling for the PSP orchestrator
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "INVALID_MERCHANT_CREDENTIALS")]
    InvalidMerchantCredentials,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "TRANSACTION_ALREADY_FINALIZED")]
    TransactionAlreadyFinalized,
    #[serde(rename = "DUPLICATE_TRANSACTION")]
    DuplicateTransaction,
    #[serde(rename = "PAYMENT_METHOD_DISABLED")]
    PaymentMethodDisabled,
    #[serde(rename = "PAYMENT_METHOD_MISMATCH")]
    PaymentMethodMismatch,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "DISPATCH_ERROR")]
    DispatchError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_RAIL_ERROR")]
    PaymentRailError,
    #[serde(rename = "EXTERNAL_SERVICE_UNAVAILABLE")]
    ExternalServiceUnavailable,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Merchant id/username and password do not match a merchant
    InvalidCredentials { merchant: String },
    /// No transaction matches the given reference
    TransactionNotFound { reference: String },
    /// Transaction already left IN_PROGRESS
    TransactionAlreadyFinalized {
        transaction_id: String,
        status: String,
    },
    /// Merchant order id or QR reference already used
    DuplicateTransaction { reference: String },
    /// The rail for this method is switched off
    PaymentMethodDisabled { method: String },
    /// Instrument submitted for a transaction started on another rail
    PaymentMethodMismatch {
        transaction_id: String,
        method: String,
    },
}

/// Infrastructure-level errors (database, configuration, background dispatch)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
    /// Outbound job could not be queued
    Dispatch { message: String },
}

/// External service errors (payment rails, QR registry, webshop)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// A rail answered with an error or an unreadable body
    PaymentRail {
        rail: String,
        message: String,
        is_retryable: bool,
    },
    /// The service could not be reached
    Unavailable { service: String, message: String },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Unsupported or empty currency
    InvalidCurrency { currency: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field present but malformed
    InvalidFormat { field: String, reason: String },
    /// Payment method name or code is not known
    UnsupportedPaymentMethod { method: String },
    /// Callback carried a non-terminal status
    NonTerminalStatus { status: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(error: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(error))
    }

    pub fn domain(error: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(error))
    }

    pub fn transaction_not_found(reference: impl Into<String>) -> Self {
        Self::domain(DomainError::TransactionNotFound {
            reference: reference.into(),
        })
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidCredentials { .. } => 401,
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::TransactionAlreadyFinalized { .. } => 409, // Conflict
                DomainError::DuplicateTransaction { .. } => 409,
                DomainError::PaymentMethodDisabled { .. } => 400,
                DomainError::PaymentMethodMismatch { .. } => 400,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentRail { .. } => 502, // Bad Gateway
                ExternalError::Unavailable { .. } => 503,
                ExternalError::Timeout { .. } => 504, // Gateway Timeout
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidCredentials { .. } => ErrorCode::InvalidMerchantCredentials,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::TransactionAlreadyFinalized { .. } => {
                    ErrorCode::TransactionAlreadyFinalized
                }
                DomainError::DuplicateTransaction { .. } => ErrorCode::DuplicateTransaction,
                DomainError::PaymentMethodDisabled { .. } => ErrorCode::PaymentMethodDisabled,
                DomainError::PaymentMethodMismatch { .. } => ErrorCode::PaymentMethodMismatch,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Dispatch { .. } => ErrorCode::DispatchError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentRail { .. } => ErrorCode::PaymentRailError,
                ExternalError::Unavailable { .. } => ErrorCode::ExternalServiceUnavailable,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidCredentials { .. } => "Invalid merchant".to_string(),
                DomainError::TransactionNotFound { reference } => {
                    format!("Transaction '{}' not found", reference)
                }
                DomainError::TransactionAlreadyFinalized {
                    transaction_id,
                    status,
                } => {
                    format!(
                        "Transaction '{}' is already finalized with status {}",
                        transaction_id, status
                    )
                }
                DomainError::DuplicateTransaction { reference } => {
                    format!("Transaction '{}' already exists", reference)
                }
                DomainError::PaymentMethodDisabled { method } => {
                    format!("Payment method {} is not enabled", method)
                }
                DomainError::PaymentMethodMismatch {
                    transaction_id,
                    method,
                } => {
                    format!(
                        "Transaction '{}' was started for {} payment",
                        transaction_id, method
                    )
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentRail {
                    rail, is_retryable, ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment service ({}) is temporarily unavailable. Please try again",
                            rail
                        )
                    } else {
                        format!("Payment service ({}) rejected the request", rail)
                    }
                }
                ExternalError::Unavailable { service, .. } => {
                    format!("{} service unavailable", service)
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidCurrency { currency, reason } => {
                    format!("Invalid currency '{}': {}", currency, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidFormat { field, reason } => {
                    format!("Invalid {}: {}", field, reason)
                }
                ValidationError::UnsupportedPaymentMethod { method } => {
                    format!("Unsupported payment method '{}'", method)
                }
                ValidationError::NonTerminalStatus { status } => {
                    format!("Status {} is not a terminal status", status)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Dispatch { .. } => true,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentRail { is_retryable, .. } => *is_retryable,
                ExternalError::Unavailable { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError>, From<PaymentError> and From<DispatchError> live next to
// their error types.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
