use crate::database::repository::{MerchantDirectory, SubscriptionStore};
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::payments::types::PaymentMethod;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUrlRequest {
    pub merchant_id: i64,
    pub merchant_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub merchant_id: i64,
    pub merchant_password: String,
    pub methods: Vec<i64>,
}

/// Manages which payment methods a merchant offers
pub struct SubscriptionService {
    merchants: Arc<dyn MerchantDirectory>,
    store: Arc<dyn SubscriptionStore>,
    page_url: String,
}

impl SubscriptionService {
    pub fn new(
        merchants: Arc<dyn MerchantDirectory>,
        store: Arc<dyn SubscriptionStore>,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            merchants,
            store,
            page_url: page_url.into(),
        }
    }

    /// Link to the subscription page for an authenticated merchant
    pub async fn subscription_url(
        &self,
        request: &SubscriptionUrlRequest,
    ) -> AppResult<SubscriptionUrlResponse> {
        self.authorize(request.merchant_id, &request.merchant_password)
            .await?;
        Ok(SubscriptionUrlResponse {
            url: format!("{}?merchantId={}", self.page_url, request.merchant_id),
        })
    }

    /// Delete every subscription of the merchant and store `methods` instead
    pub async fn replace(&self, request: &SubscriptionRequest) -> AppResult<()> {
        self.authorize(request.merchant_id, &request.merchant_password)
            .await?;

        let methods = request
            .methods
            .iter()
            .map(|code| {
                PaymentMethod::from_subscription_code(*code).ok_or_else(|| {
                    AppError::validation(ValidationError::UnsupportedPaymentMethod {
                        method: code.to_string(),
                    })
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        self.store.replace(request.merchant_id, &methods).await?;
        info!(
            merchant_id = request.merchant_id,
            methods = ?methods,
            "Subscriptions replaced"
        );
        Ok(())
    }

    /// Subscription codes of the merchant
    pub async fn list(&self, merchant_id: i64) -> AppResult<Vec<i16>> {
        Ok(self
            .store
            .list(merchant_id)
            .await?
            .iter()
            .map(PaymentMethod::subscription_code)
            .collect())
    }

    pub async fn list_merchants(&self) -> AppResult<Vec<String>> {
        Ok(self.merchants.list_usernames().await?)
    }

    async fn authorize(&self, merchant_id: i64, password: &str) -> AppResult<()> {
        match self.merchants.check_merchant(merchant_id, password).await? {
            Some(_) => Ok(()),
            None => {
                warn!(merchant_id, "Merchant authorization failed");
                Err(AppError::domain(DomainError::InvalidCredentials {
                    merchant: merchant_id.to_string(),
                }))
            }
        }
    }
}
