//! Reconciles rail callbacks against the ledger and notifies the webshop.
//!
//! Every rail reports its final status here. Only the first terminal callback
//! for a transaction is applied; later ones are rejected without a
//! notification.

use crate::database::repository::{LedgerTransition, MerchantDirectory, TransactionLedger};
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::payments::types::{MessageResponse, TransactionResponse, WebshopNotification};
use crate::services::dispatcher::{OutboundDispatcher, OutboundJob};
use std::sync::Arc;
use tracing::{info, warn};

pub const PAYMENT_RESPONSE_FORWARDED: &str = "Payment response forwarded";

pub struct CallbackProcessor {
    merchants: Arc<dyn MerchantDirectory>,
    ledger: Arc<dyn TransactionLedger>,
    dispatcher: OutboundDispatcher,
}

impl CallbackProcessor {
    pub fn new(
        merchants: Arc<dyn MerchantDirectory>,
        ledger: Arc<dyn TransactionLedger>,
        dispatcher: OutboundDispatcher,
    ) -> Self {
        Self {
            merchants,
            ledger,
            dispatcher,
        }
    }

    pub async fn handle(&self, callback: TransactionResponse) -> AppResult<MessageResponse> {
        if !callback.status.is_terminal() {
            return Err(AppError::validation(ValidationError::NonTerminalStatus {
                status: callback.status.to_string(),
            }));
        }

        let transition = self
            .ledger
            .complete(callback.transaction_id, callback.status)
            .await?;

        let (merchant_id, merchant_order_id) = match transition {
            LedgerTransition::Applied {
                merchant_id,
                merchant_order_id,
            } => (merchant_id, merchant_order_id),
            LedgerTransition::NotFound => {
                warn!(transaction_id = %callback.transaction_id, "Callback for unknown transaction");
                return Err(AppError::transaction_not_found(
                    callback.transaction_id.to_string(),
                ));
            }
            LedgerTransition::AlreadyTerminal { current } => {
                warn!(
                    transaction_id = %callback.transaction_id,
                    current = %current,
                    reported = %callback.status,
                    "Duplicate callback ignored"
                );
                return Err(AppError::domain(DomainError::TransactionAlreadyFinalized {
                    transaction_id: callback.transaction_id.to_string(),
                    status: current.to_string(),
                }));
            }
        };

        info!(
            transaction_id = %callback.transaction_id,
            status = %callback.status,
            acquirer_order_id = ?callback.acquirer_order_id,
            "✅ Transaction finalized"
        );

        if merchant_order_id != callback.merchant_order_id {
            warn!(
                transaction_id = %callback.transaction_id,
                ledger = %merchant_order_id,
                callback = %callback.merchant_order_id,
                "Callback merchantOrderId differs from ledger"
            );
        }

        let url = match self.merchants.redirect_url(merchant_id, callback.status).await {
            Ok(url) => url.unwrap_or_default(),
            Err(e) => {
                warn!(merchant_id, error = %e, "Merchant redirect lookup failed");
                String::new()
            }
        };

        self.dispatcher
            .submit(OutboundJob::WebshopNotification(WebshopNotification {
                url,
                merchant_order_id,
            }));

        Ok(MessageResponse::new(PAYMENT_RESPONSE_FORWARDED))
    }
}
