//! Services module for business logic and integrations

pub mod callback_processor;
pub mod dispatcher;
pub mod notification;
pub mod payment_orchestrator;
pub mod subscription;

pub use callback_processor::CallbackProcessor;
pub use dispatcher::{DispatchError, OutboundDispatcher, OutboundJob};
pub use notification::WebshopNotifier;
pub use payment_orchestrator::PaymentOrchestrator;
pub use subscription::SubscriptionService;
