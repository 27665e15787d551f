pub mod outbound_dispatch;
pub mod pending_transaction_monitor;
