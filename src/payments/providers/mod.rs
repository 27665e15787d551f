pub mod bank_gateway;
pub mod card;
pub mod crypto;
pub mod nbs;
pub mod paypal;

pub use bank_gateway::BankGatewayClient;
pub use card::{CardRail, QrRail};
pub use crypto::{convert_to_crypto, CryptoPaymentRequest, CryptoRail, CryptoServiceClient};
pub use nbs::{QrImage, QrRegistryClient};
pub use paypal::{PayPalConfig, PayPalRail};
