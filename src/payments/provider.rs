use crate::database::transaction_repository::Transaction;
use crate::payments::error::PaymentResult;
use crate::payments::types::{PaymentMethod, PaymentStartResponse};
use async_trait::async_trait;

/// A downstream rail that can take over a freshly persisted transaction.
///
/// Implementations only produce the redirect target; the final status always
/// comes back through the payment callback.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn start_payment(&self, transaction: &Transaction) -> PaymentResult<PaymentStartResponse>;
}
