use thiserror::Error;

/// Unique index on `transactions.qr_ref`
pub const QR_REF_CONSTRAINT: &str = "transactions_qr_ref_key";

/// Database failure classified by what the caller can do about it
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum DatabaseErrorKind {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("migration failed: {message}")]
    Migration { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn from_sqlx(error: sqlx::Error) -> Self {
        let kind = match &error {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseErrorKind::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseErrorKind::Connection {
                message: error.to_string(),
            },
            _ => DatabaseErrorKind::Unknown {
                message: error.to_string(),
            },
        };
        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    /// Two QR transactions drew the same timestamp-derived reference
    pub fn is_qr_ref_collision(&self) -> bool {
        matches!(
            &self.kind,
            DatabaseErrorKind::UniqueViolation { constraint } if constraint == QR_REF_CONSTRAINT
        )
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::new(DatabaseErrorKind::Migration {
            message: error.to_string(),
        })
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        match err.kind {
            DatabaseErrorKind::NotFound => AppError::transaction_not_found("record"),
            // qr references are generated here, so this is not a duplicate order
            DatabaseErrorKind::UniqueViolation { constraint } if constraint == QR_REF_CONSTRAINT => {
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: "qr reference collision".to_string(),
                    is_retryable: true,
                }))
            }
            DatabaseErrorKind::UniqueViolation { constraint } => {
                AppError::domain(DomainError::DuplicateTransaction {
                    reference: constraint,
                })
            }
            kind => {
                let is_retryable = matches!(kind, DatabaseErrorKind::Connection { .. });
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: kind.to_string(),
                    is_retryable,
                }))
            }
        }
    }
}
