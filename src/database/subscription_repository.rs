use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::SubscriptionStore;
use crate::payments::types::PaymentMethod;
use async_trait::async_trait;
use sqlx::PgPool;

/// Repository for the payment methods a merchant subscribed to
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn replace(
        &self,
        merchant_id: i64,
        methods: &[PaymentMethod],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query("DELETE FROM subscriptions WHERE merchant_id = $1")
            .bind(merchant_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        for method in methods {
            sqlx::query(
                "INSERT INTO subscriptions (merchant_id, method) VALUES ($1, $2)
                 ON CONFLICT (merchant_id, method) DO NOTHING",
            )
            .bind(merchant_id)
            .bind(method.subscription_code())
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)
    }

    async fn list(&self, merchant_id: i64) -> Result<Vec<PaymentMethod>, DatabaseError> {
        let codes: Vec<i16> = sqlx::query_scalar(
            "SELECT method FROM subscriptions WHERE merchant_id = $1 ORDER BY subscription_id",
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        codes
            .into_iter()
            .map(|code| {
                PaymentMethod::from_subscription_code(code as i64).ok_or_else(|| {
                    DatabaseError::new(DatabaseErrorKind::Unknown {
                        message: format!("unknown subscription method code {}", code),
                    })
                })
            })
            .collect()
    }
}
