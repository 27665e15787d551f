use crate::database::error::DatabaseError;
use crate::database::repository::MerchantDirectory;
use crate::payments::types::TransactionStatus;
use crate::payments::utils::{secure_eq, sha512_hex};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Merchant entity. Provisioned out of band, read-only here.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub merchant_id: i64,
    pub username: String,
    /// Hex SHA-512 of password followed by salt
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub salt: String,
    #[serde(rename = "successURL")]
    pub success_url: String,
    #[serde(rename = "failURL")]
    pub fail_url: String,
    #[serde(rename = "errorURL")]
    pub error_url: String,
}

impl Merchant {
    /// Hash a clear-text password the way merchant rows store it
    pub fn hash_password(password: &str, salt: &str) -> String {
        sha512_hex(&format!("{}{}", password, salt))
    }

    pub fn verify_password(&self, password: &str) -> bool {
        let computed = Self::hash_password(password, &self.salt);
        secure_eq(
            computed.as_bytes(),
            self.password.trim().to_lowercase().as_bytes(),
        )
    }

    /// Where the shopper goes once the transaction reached `status`.
    /// Empty configured URLs count as missing.
    pub fn redirect_url_for(&self, status: TransactionStatus) -> Option<&str> {
        let url = match status {
            TransactionStatus::Successful => &self.success_url,
            TransactionStatus::Failed => &self.fail_url,
            TransactionStatus::Error => &self.error_url,
            TransactionStatus::InProgress => return None,
        };
        if url.is_empty() {
            None
        } else {
            Some(url.as_str())
        }
    }
}

/// Repository for merchant lookups
pub struct MerchantRepository {
    pool: PgPool,
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantDirectory for MerchantRepository {
    async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError> {
        sqlx::query_as::<_, Merchant>(
            "SELECT merchant_id, username, password, salt, success_url, fail_url, error_url
             FROM merchants
             WHERE merchant_id = $1",
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_merchant_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Merchant>, DatabaseError> {
        sqlx::query_as::<_, Merchant>(
            "SELECT merchant_id, username, password, salt, success_url, fail_url, error_url
             FROM merchants
             WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_usernames(&self) -> Result<Vec<String>, DatabaseError> {
        sqlx::query_scalar::<_, String>("SELECT username FROM merchants ORDER BY merchant_id")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merchant(password: &str, salt: &str) -> Merchant {
        Merchant {
            merchant_id: 1,
            username: "shop".to_string(),
            password: Merchant::hash_password(password, salt),
            salt: salt.to_string(),
            success_url: "http://shop/success".to_string(),
            fail_url: "http://shop/fail".to_string(),
            error_url: String::new(),
        }
    }

    #[test]
    fn verify_password_accepts_only_matching_password() {
        let m = merchant("secret", "pepper");
        assert!(m.verify_password("secret"));
        assert!(!m.verify_password("Secret"));
        assert!(!m.verify_password("secretpepper"));
        assert!(!m.verify_password(""));
    }

    #[test]
    fn stored_uppercase_hash_still_verifies() {
        let mut m = merchant("secret", "pepper");
        m.password = m.password.to_uppercase();
        assert!(m.verify_password("secret"));
    }

    #[test]
    fn redirect_url_depends_only_on_status() {
        let m = merchant("secret", "pepper");
        assert_eq!(
            m.redirect_url_for(TransactionStatus::Successful),
            Some("http://shop/success")
        );
        assert_eq!(
            m.redirect_url_for(TransactionStatus::Failed),
            Some("http://shop/fail")
        );
        assert_eq!(m.redirect_url_for(TransactionStatus::Error), None);
        assert_eq!(m.redirect_url_for(TransactionStatus::InProgress), None);
        assert_eq!(
            m.redirect_url_for(TransactionStatus::Successful),
            m.redirect_url_for(TransactionStatus::Successful)
        );
    }

    #[test]
    fn serialized_merchant_hides_credentials() {
        let json = serde_json::to_value(merchant("secret", "pepper")).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("salt").is_none());
        assert_eq!(json["successURL"], "http://shop/success");
    }
}
