use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{LedgerTransition, TransactionLedger};
use crate::payments::types::{generate_qr_ref, PaymentMethod, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One payment attempt as recorded in the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub merchant_id: i64,
    pub merchant_order_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub merchant_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_ref: Option<u64>,
}

impl Transaction {
    /// Fresh IN_PROGRESS transaction. QR payments get a reference derived from `now`.
    pub fn new_in_progress(
        merchant_id: i64,
        merchant_order_id: Uuid,
        amount: f64,
        currency: &str,
        payment_method: PaymentMethod,
        merchant_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let qr_ref = match payment_method {
            PaymentMethod::Qr => Some(generate_qr_ref(now)),
            _ => None,
        };

        Self {
            transaction_id: Uuid::new_v4(),
            merchant_id,
            merchant_order_id,
            amount,
            currency: currency.trim().to_uppercase(),
            payment_method,
            status: TransactionStatus::InProgress,
            timestamp: now,
            merchant_timestamp,
            qr_ref,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: Uuid,
    merchant_id: i64,
    merchant_order_id: Uuid,
    amount: f64,
    currency: String,
    payment_method: String,
    status: i16,
    created_at: DateTime<Utc>,
    merchant_timestamp: DateTime<Utc>,
    qr_ref: Option<i64>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| DatabaseError::new(DatabaseErrorKind::Unknown { message });

        let payment_method = row.payment_method.parse::<PaymentMethod>().map_err(|_| {
            corrupt(format!(
                "transaction {} has unknown payment method '{}'",
                row.transaction_id, row.payment_method
            ))
        })?;
        let status = TransactionStatus::from_code(row.status as i64).ok_or_else(|| {
            corrupt(format!(
                "transaction {} has unknown status {}",
                row.transaction_id, row.status
            ))
        })?;
        let qr_ref = row
            .qr_ref
            .map(u64::try_from)
            .transpose()
            .map_err(|_| corrupt(format!("transaction {} has negative qr_ref", row.transaction_id)))?;

        Ok(Transaction {
            transaction_id: row.transaction_id,
            merchant_id: row.merchant_id,
            merchant_order_id: row.merchant_order_id,
            amount: row.amount,
            currency: row.currency,
            payment_method,
            status,
            timestamp: row.created_at,
            merchant_timestamp: row.merchant_timestamp,
            qr_ref,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT transaction_id, merchant_id, merchant_order_id, amount, currency,
        payment_method, status, created_at, merchant_timestamp, qr_ref
 FROM transactions";

/// Repository for managing transactions
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionLedger for TransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), DatabaseError> {
        let qr_ref = transaction
            .qr_ref
            .map(i64::try_from)
            .transpose()
            .map_err(|_| {
                DatabaseError::new(DatabaseErrorKind::Unknown {
                    message: "qr_ref exceeds BIGINT range".to_string(),
                })
            })?;

        sqlx::query(
            "INSERT INTO transactions
             (transaction_id, merchant_id, merchant_order_id, amount, currency,
              payment_method, status, created_at, merchant_timestamp, qr_ref)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(transaction.transaction_id)
        .bind(transaction.merchant_id)
        .bind(transaction.merchant_order_id)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.payment_method.as_str())
        .bind(transaction.status.code())
        .bind(transaction.timestamp)
        .bind(transaction.merchant_timestamp)
        .bind(qr_ref)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        let sql = format!("{} WHERE transaction_id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        row.map(Transaction::try_from).transpose()
    }

    async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: Uuid,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let sql = format!("{} WHERE merchant_order_id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(merchant_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        row.map(Transaction::try_from).transpose()
    }

    async fn find_by_qr_ref(&self, qr_ref: u64) -> Result<Option<Transaction>, DatabaseError> {
        // References beyond BIGINT can never have been stored
        let Ok(qr_ref) = i64::try_from(qr_ref) else {
            return Ok(None);
        };
        let sql = format!("{} WHERE qr_ref = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(qr_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        row.map(Transaction::try_from).transpose()
    }

    async fn complete(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<LedgerTransition, DatabaseError> {
        let updated: Option<(i64, Uuid)> = sqlx::query_as(
            "UPDATE transactions
             SET status = $2, updated_at = NOW()
             WHERE transaction_id = $1 AND status = $3
             RETURNING merchant_id, merchant_order_id",
        )
        .bind(transaction_id)
        .bind(status.code())
        .bind(TransactionStatus::InProgress.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some((merchant_id, merchant_order_id)) = updated {
            return Ok(LedgerTransition::Applied {
                merchant_id,
                merchant_order_id,
            });
        }

        let current: Option<i16> =
            sqlx::query_scalar("SELECT status FROM transactions WHERE transaction_id = $1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        Ok(match current.and_then(|code| TransactionStatus::from_code(code as i64)) {
            Some(current) => LedgerTransition::AlreadyTerminal { current },
            None => LedgerTransition::NotFound,
        })
    }

    async fn find_stale_in_progress(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let sql = format!(
            "{} WHERE status = $1 AND created_at < $2 ORDER BY created_at ASC LIMIT $3",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(TransactionStatus::InProgress.code())
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}
