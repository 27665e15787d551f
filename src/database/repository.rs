//! Data-access seams used by the services.
//!
//! Each trait has a Postgres implementation next to it and an in-memory one in
//! [`crate::database::in_memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::merchant_repository::Merchant;
use crate::database::transaction_repository::Transaction;
use crate::payments::types::{PaymentMethod, TransactionStatus};

#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError>;

    async fn find_merchant_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Merchant>, DatabaseError>;

    async fn list_usernames(&self) -> Result<Vec<String>, DatabaseError>;

    /// Merchant whose credentials match, `None` for an unknown id or a wrong password
    async fn check_merchant(
        &self,
        merchant_id: i64,
        password: &str,
    ) -> Result<Option<Merchant>, DatabaseError> {
        Ok(self
            .find_merchant(merchant_id)
            .await?
            .filter(|merchant| merchant.verify_password(password)))
    }

    async fn check_merchant_by_username(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Merchant>, DatabaseError> {
        Ok(self
            .find_merchant_by_username(username)
            .await?
            .filter(|merchant| merchant.verify_password(password)))
    }

    async fn redirect_url(
        &self,
        merchant_id: i64,
        status: TransactionStatus,
    ) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .find_merchant(merchant_id)
            .await?
            .and_then(|merchant| merchant.redirect_url_for(status).map(str::to_string)))
    }
}

/// Result of moving a transaction out of IN_PROGRESS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerTransition {
    Applied {
        merchant_id: i64,
        merchant_order_id: Uuid,
    },
    NotFound,
    AlreadyTerminal {
        current: TransactionStatus,
    },
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Fails with a unique violation on a reused merchant order id or qr reference
    async fn insert(&self, transaction: &Transaction) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, DatabaseError>;

    async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: Uuid,
    ) -> Result<Option<Transaction>, DatabaseError>;

    async fn find_by_qr_ref(&self, qr_ref: u64) -> Result<Option<Transaction>, DatabaseError>;

    /// Apply a terminal status, only if the transaction is still IN_PROGRESS
    async fn complete(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<LedgerTransition, DatabaseError>;

    /// IN_PROGRESS transactions created before `older_than`, oldest first
    async fn find_stale_in_progress(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Replace the merchant's methods with `methods`
    async fn replace(
        &self,
        merchant_id: i64,
        methods: &[PaymentMethod],
    ) -> Result<(), DatabaseError>;

    async fn list(&self, merchant_id: i64) -> Result<Vec<PaymentMethod>, DatabaseError>;
}
