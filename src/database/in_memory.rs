//! Process-local store implementing every repository trait.
//!
//! Backs `SKIP_EXTERNALS=true` runs and the test suites. It mirrors the
//! Postgres constraints: unique merchant order ids, unique qr references and
//! IN_PROGRESS-only completion.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind, QR_REF_CONSTRAINT};
use crate::database::merchant_repository::Merchant;
use crate::database::repository::{
    LedgerTransition, MerchantDirectory, SubscriptionStore, TransactionLedger,
};
use crate::database::transaction_repository::Transaction;
use crate::payments::types::{PaymentMethod, TransactionStatus};

#[derive(Default)]
pub struct InMemoryStore {
    merchants: RwLock<Vec<Merchant>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    subscriptions: RwLock<HashMap<i64, Vec<PaymentMethod>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merchant(mut self, merchant: Merchant) -> Self {
        let merchants = self.merchants.get_mut();
        merchants.retain(|m| m.merchant_id != merchant.merchant_id);
        merchants.push(merchant);
        self
    }

    /// Demo merchant for local runs: id 1, username `demo`, password `demo`
    pub fn demo() -> Self {
        let salt = "demo-salt".to_string();
        Self::new().with_merchant(Merchant {
            merchant_id: 1,
            username: "demo".to_string(),
            password: Merchant::hash_password("demo", &salt),
            salt,
            success_url: "http://localhost:3000/success".to_string(),
            fail_url: "http://localhost:3000/fail".to_string(),
            error_url: "http://localhost:3000/error".to_string(),
        })
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
        constraint: constraint.to_string(),
    })
}

#[async_trait]
impl MerchantDirectory for InMemoryStore {
    async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError> {
        Ok(self
            .merchants
            .read()
            .await
            .iter()
            .find(|m| m.merchant_id == merchant_id)
            .cloned())
    }

    async fn find_merchant_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Merchant>, DatabaseError> {
        Ok(self
            .merchants
            .read()
            .await
            .iter()
            .find(|m| m.username == username)
            .cloned())
    }

    async fn list_usernames(&self) -> Result<Vec<String>, DatabaseError> {
        let mut merchants = self.merchants.read().await.clone();
        merchants.sort_by_key(|m| m.merchant_id);
        Ok(merchants.into_iter().map(|m| m.username).collect())
    }
}

#[async_trait]
impl TransactionLedger for InMemoryStore {
    async fn insert(&self, transaction: &Transaction) -> Result<(), DatabaseError> {
        let mut transactions = self.transactions.write().await;

        if transactions.contains_key(&transaction.transaction_id) {
            return Err(unique_violation("transactions_pkey"));
        }
        if transactions
            .values()
            .any(|t| t.merchant_order_id == transaction.merchant_order_id)
        {
            return Err(unique_violation("transactions_merchant_order_id_key"));
        }
        if let Some(qr_ref) = transaction.qr_ref {
            if transactions.values().any(|t| t.qr_ref == Some(qr_ref)) {
                return Err(unique_violation(QR_REF_CONSTRAINT));
            }
        }

        transactions.insert(transaction.transaction_id, transaction.clone());
        Ok(())
    }

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self.transactions.read().await.get(&transaction_id).cloned())
    }

    async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: Uuid,
    ) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|t| t.merchant_order_id == merchant_order_id)
            .cloned())
    }

    async fn find_by_qr_ref(&self, qr_ref: u64) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|t| t.qr_ref == Some(qr_ref))
            .cloned())
    }

    async fn complete(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<LedgerTransition, DatabaseError> {
        let mut transactions = self.transactions.write().await;
        let Some(transaction) = transactions.get_mut(&transaction_id) else {
            return Ok(LedgerTransition::NotFound);
        };

        if transaction.status != TransactionStatus::InProgress {
            return Ok(LedgerTransition::AlreadyTerminal {
                current: transaction.status,
            });
        }

        transaction.status = status;
        Ok(LedgerTransition::Applied {
            merchant_id: transaction.merchant_id,
            merchant_order_id: transaction.merchant_order_id,
        })
    }

    async fn find_stale_in_progress(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let mut stale: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.status == TransactionStatus::InProgress && t.timestamp < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.timestamp);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn replace(
        &self,
        merchant_id: i64,
        methods: &[PaymentMethod],
    ) -> Result<(), DatabaseError> {
        let mut deduped: Vec<PaymentMethod> = Vec::with_capacity(methods.len());
        for method in methods {
            if !deduped.contains(method) {
                deduped.push(*method);
            }
        }
        self.subscriptions.write().await.insert(merchant_id, deduped);
        Ok(())
    }

    async fn list(&self, merchant_id: i64) -> Result<Vec<PaymentMethod>, DatabaseError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .get(&merchant_id)
            .cloned()
            .unwrap_or_default())
    }
}
