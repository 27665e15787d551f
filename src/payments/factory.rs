use crate::config::RailConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentRail;
use crate::payments::providers::{CardRail, CryptoRail, PayPalConfig, PayPalRail, QrRail};
use crate::payments::types::PaymentMethod;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the enabled rails once and hands them out by payment method
pub struct PaymentRailFactory {
    rails: HashMap<PaymentMethod, Arc<dyn PaymentRail>>,
}

impl PaymentRailFactory {
    pub fn from_config(config: &RailConfig) -> PaymentResult<Self> {
        let mut factory = Self {
            rails: HashMap::new(),
        };

        for method in &config.enabled_methods {
            let rail: Arc<dyn PaymentRail> = match method {
                PaymentMethod::Card => Arc::new(CardRail::new(&config.card_page_url)),
                PaymentMethod::Qr => Arc::new(QrRail::new(&config.qr_page_url)),
                PaymentMethod::PayPal => Arc::new(PayPalRail::new(PayPalConfig {
                    service_url: config.paypal_service_url.clone(),
                    timeout: config.outbound_timeout,
                })?),
                PaymentMethod::Crypto => Arc::new(CryptoRail::new(&config.crypto_page_url)),
            };
            factory.register(rail);
        }

        Ok(factory)
    }

    /// Factory with no rails; add them with [`register`](Self::register)
    pub fn empty() -> Self {
        Self {
            rails: HashMap::new(),
        }
    }

    pub fn register(&mut self, rail: Arc<dyn PaymentRail>) {
        self.rails.insert(rail.method(), rail);
    }

    pub fn with_rail(mut self, rail: Arc<dyn PaymentRail>) -> Self {
        self.register(rail);
        self
    }

    pub fn get_rail(&self, method: PaymentMethod) -> PaymentResult<Arc<dyn PaymentRail>> {
        self.rails
            .get(&method)
            .cloned()
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!("payment method {} is disabled", method),
                field: Some("paymentMethod".to_string()),
            })
    }

    pub fn is_enabled(&self, method: PaymentMethod) -> bool {
        self.rails.contains_key(&method)
    }

    pub fn list_available_methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|method| self.rails.contains_key(method))
            .collect()
    }
}
