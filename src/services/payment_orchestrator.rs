//! Payment Orchestrator Service
//!
//! Authenticates the webshop, writes the transaction to the ledger, hands it
//! to the rail selected by its payment method and attaches card instruments
//! (typed in on the card page or scanned from an IPS QR code) before they are
//! forwarded to the bank gateway.

use crate::database::error::DatabaseError;
use crate::database::repository::{MerchantDirectory, TransactionLedger};
use crate::database::transaction_repository::Transaction;
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::payments::factory::PaymentRailFactory;
use crate::payments::providers::{
    CryptoPaymentRequest, CryptoServiceClient, QrImage, QrRegistryClient,
};
use crate::payments::providers::crypto::DEFAULT_CRYPTO_CURRENCY;
use crate::payments::types::{
    generate_qr_ref, parse_expiry_date, BankPaymentRequest, CardDetailsRequest, MessageResponse,
    PaymentMethod, PaymentStartResponse, TransactionStatus, TransactionStatusResponse,
    WebShopPaymentRequest,
};
use crate::services::dispatcher::{OutboundDispatcher, OutboundJob};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const PAYMENT_REQUEST_FORWARDED: &str = "Payment request forwarded";

const MIN_CARD_DIGITS: usize = 12;
const MAX_CARD_DIGITS: usize = 19;

/// QR references have millisecond resolution
const QR_REF_REDRAW_DELAY: std::time::Duration = std::time::Duration::from_millis(1);

// ============================================================================
// Main Payment Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    merchants: Arc<dyn MerchantDirectory>,
    ledger: Arc<dyn TransactionLedger>,
    rails: PaymentRailFactory,
    dispatcher: OutboundDispatcher,
    crypto: Arc<CryptoServiceClient>,
    qr_registry: Arc<QrRegistryClient>,
}

impl PaymentOrchestrator {
    pub fn new(
        merchants: Arc<dyn MerchantDirectory>,
        ledger: Arc<dyn TransactionLedger>,
        rails: PaymentRailFactory,
        dispatcher: OutboundDispatcher,
        crypto: Arc<CryptoServiceClient>,
        qr_registry: Arc<QrRegistryClient>,
    ) -> Self {
        Self {
            merchants,
            ledger,
            rails,
            dispatcher,
            crypto,
            qr_registry,
        }
    }

    // =========================================================================
    // Payment Initiation
    // =========================================================================

    /// Validate, authorize and persist the purchase, then start it on its rail.
    ///
    /// The transaction is written before any rail is contacted. A rail that
    /// fails to start leaves it IN_PROGRESS.
    pub async fn initiate(&self, request: WebShopPaymentRequest) -> AppResult<PaymentStartResponse> {
        let method = Self::validate_purchase(&request)?;
        let rail = self.rails.get_rail(method).map_err(|_| {
            AppError::domain(DomainError::PaymentMethodDisabled {
                method: method.to_string(),
            })
        })?;

        let merchant = self
            .merchants
            .check_merchant(request.merchant_id, &request.merchant_password)
            .await?;
        if merchant.is_none() {
            warn!(merchant_id = request.merchant_id, "Merchant authorization failed");
            return Err(AppError::domain(DomainError::InvalidCredentials {
                merchant: request.merchant_id.to_string(),
            }));
        }

        if let Some(deadline) = request.payment_deadline {
            if deadline < Utc::now() {
                warn!(
                    merchant_order_id = %request.merchant_order_id,
                    %deadline,
                    "Payment deadline already passed"
                );
            }
        }

        let transaction = Transaction::new_in_progress(
            request.merchant_id,
            request.merchant_order_id,
            request.amount,
            &request.currency,
            method,
            request.merchant_timestamp,
            Utc::now(),
        );
        let transaction = self.record(transaction).await.map_err(|e| {
            AppError::from(e).with_context(format!("merchant order {}", request.merchant_order_id))
        })?;

        info!(
            transaction_id = %transaction.transaction_id,
            merchant_order_id = %transaction.merchant_order_id,
            merchant_id = transaction.merchant_id,
            payment_method = %method,
            qr_ref = ?transaction.qr_ref,
            "💳 Transaction created"
        );

        match rail.start_payment(&transaction).await {
            Ok(response) => {
                info!(
                    transaction_id = %transaction.transaction_id,
                    token_id = %response.token_id,
                    "Payment started"
                );
                Ok(response)
            }
            Err(e) => {
                error!(
                    transaction_id = %transaction.transaction_id,
                    payment_method = %method,
                    error = %e,
                    "Rail failed to start payment, transaction left in progress"
                );
                Err(e.into_rail_error(method.as_str()))
            }
        }
    }

    /// Insert the transaction. A QR reference taken by a concurrent purchase in
    /// the same millisecond is drawn again once.
    async fn record(&self, mut transaction: Transaction) -> Result<Transaction, DatabaseError> {
        match self.ledger.insert(&transaction).await {
            Err(e) if e.is_qr_ref_collision() => {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    qr_ref = ?transaction.qr_ref,
                    "QR reference already taken, drawing a new one"
                );
                tokio::time::sleep(QR_REF_REDRAW_DELAY).await;
                transaction.qr_ref = Some(generate_qr_ref(Utc::now()));
                self.ledger.insert(&transaction).await?;
                Ok(transaction)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(transaction),
        }
    }

    fn validate_purchase(request: &WebShopPaymentRequest) -> AppResult<PaymentMethod> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(AppError::validation(ValidationError::InvalidAmount {
                amount: request.amount.to_string(),
                reason: "amount must be a positive number".to_string(),
            }));
        }

        if request.currency.trim().is_empty() {
            return Err(AppError::validation(ValidationError::InvalidCurrency {
                currency: request.currency.clone(),
                reason: "currency is required".to_string(),
            }));
        }

        request.payment_method.parse::<PaymentMethod>().map_err(|_| {
            AppError::validation(ValidationError::UnsupportedPaymentMethod {
                method: request.payment_method.clone(),
            })
        })
    }

    // =========================================================================
    // Payment Instruments
    // =========================================================================

    /// Attach card details typed on the card page and forward them to the bank
    pub async fn submit_card_details(&self, request: CardDetailsRequest) -> AppResult<MessageResponse> {
        let card_number = normalize_card_number(&request.card_number)?;
        if request.card_verification_code.is_none() {
            return Err(AppError::validation(ValidationError::MissingField {
                field: "cardVerificationCode".to_string(),
            }));
        }

        let transaction = self
            .ledger
            .find_by_merchant_order_id(request.merchant_order_id)
            .await?
            .ok_or_else(|| AppError::transaction_not_found(request.merchant_order_id.to_string()))?;

        self.forward_to_bank(&transaction, card_number, request.exp_date)
    }

    /// Decode a scanned IPS QR code, find its transaction and forward the card
    /// to the bank.
    pub async fn submit_qr_scan(
        &self,
        image: QrImage,
        card_number: &str,
        exp_date: &str,
    ) -> AppResult<MessageResponse> {
        let card_number = normalize_card_number(card_number)?;
        let exp_date = parse_expiry_date(exp_date)?;

        let qr_ref = self
            .qr_registry
            .decode_reference(image)
            .await
            .map_err(|e| e.into_rail_error("nbs"))?;

        let transaction = self
            .find_by_qr_ref(qr_ref)
            .await?
            .ok_or_else(|| AppError::transaction_not_found(qr_ref.to_string()))?;

        self.forward_to_bank(&transaction, card_number, exp_date)
    }

    fn forward_to_bank(
        &self,
        transaction: &Transaction,
        card_number: String,
        exp_date: DateTime<Utc>,
    ) -> AppResult<MessageResponse> {
        if transaction.status != TransactionStatus::InProgress {
            return Err(AppError::domain(DomainError::TransactionAlreadyFinalized {
                transaction_id: transaction.transaction_id.to_string(),
                status: transaction.status.to_string(),
            }));
        }
        if !transaction.payment_method.uses_bank_gateway() {
            return Err(AppError::domain(DomainError::PaymentMethodMismatch {
                transaction_id: transaction.transaction_id.to_string(),
                method: transaction.payment_method.to_string(),
            }));
        }

        let request = BankPaymentRequest {
            exp_date,
            card_number,
            currency: transaction.currency.clone(),
            amount: transaction.amount,
            merchant_id: transaction.merchant_id,
            merchant_order_id: transaction.merchant_order_id,
            transaction_id: transaction.transaction_id,
            timestamp: Utc::now(),
        };
        self.dispatcher.submit(OutboundJob::BankPayment(request));

        info!(
            transaction_id = %transaction.transaction_id,
            payment_method = %transaction.payment_method,
            "🏦 Card instrument queued for bank gateway"
        );

        Ok(MessageResponse::new(PAYMENT_REQUEST_FORWARDED))
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub async fn find_by_qr_ref(&self, qr_ref: u64) -> AppResult<Option<Transaction>> {
        Ok(self.ledger.find_by_qr_ref(qr_ref).await?)
    }

    pub async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: Uuid,
    ) -> AppResult<Option<Transaction>> {
        Ok(self.ledger.find_by_merchant_order_id(merchant_order_id).await?)
    }

    /// Redirect URL for the webshop: empty while the payment is still running
    /// or when the merchant has no URL for the outcome.
    pub async fn transaction_status_url(
        &self,
        merchant_order_id: Uuid,
    ) -> AppResult<TransactionStatusResponse> {
        let transaction = self
            .find_by_merchant_order_id(merchant_order_id)
            .await?
            .ok_or_else(|| AppError::transaction_not_found(merchant_order_id.to_string()))?;

        if !transaction.status.is_terminal() {
            return Ok(TransactionStatusResponse { url: String::new() });
        }

        let url = self
            .merchants
            .redirect_url(transaction.merchant_id, transaction.status)
            .await?
            .unwrap_or_default();
        Ok(TransactionStatusResponse { url })
    }

    // =========================================================================
    // Crypto rail proxies
    // =========================================================================

    /// Quote the transaction in BTC with the crypto service and relay its answer
    pub async fn crypto_payment_details(&self, merchant_order_id: Uuid) -> AppResult<JsonValue> {
        let transaction = self
            .find_by_merchant_order_id(merchant_order_id)
            .await?
            .ok_or_else(|| AppError::transaction_not_found(merchant_order_id.to_string()))?;

        let request = CryptoPaymentRequest::for_transaction(&transaction, DEFAULT_CRYPTO_CURRENCY);
        info!(
            transaction_id = %transaction.transaction_id,
            fiat_amount = transaction.amount,
            fiat_currency = %transaction.currency,
            crypto_amount = request.amount,
            "🪙 Requesting crypto payment"
        );

        Ok(self.crypto.create_payment(&request).await?)
    }

    pub async fn crypto_payment_status(&self, payment_id: Uuid) -> AppResult<JsonValue> {
        Ok(self.crypto.payment_status(payment_id).await?)
    }
}

/// Strip spaces and dashes and check the result is a plausible PAN
pub fn normalize_card_number(raw: &str) -> AppResult<String> {
    let digits: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    let valid = (MIN_CARD_DIGITS..=MAX_CARD_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(AppError::validation(ValidationError::InvalidFormat {
            field: "cardNumber".to_string(),
            reason: format!(
                "card number must have {} to {} digits",
                MIN_CARD_DIGITS, MAX_CARD_DIGITS
            ),
        }));
    }
    Ok(digits)
}
