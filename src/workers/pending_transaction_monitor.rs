use crate::database::repository::TransactionLedger;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Custom error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("database error: {0}")]
    Database(#[from] crate::database::error::DatabaseError),

    #[error("invalid stale threshold: {0}")]
    InvalidThreshold(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PendingMonitorConfig {
    pub enabled: bool,
    /// How often the worker wakes up to scan the ledger.
    pub poll_interval: Duration,
    /// A transaction IN_PROGRESS for longer than this is reported as stuck.
    pub stale_after: Duration,
    /// Maximum number of stuck transactions reported per cycle.
    pub batch_size: i64,
}

impl Default for PendingMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(1800),
            batch_size: 100,
        }
    }
}

impl PendingMonitorConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = std::env::var("PENDING_MONITOR_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(cfg.enabled);
        cfg.poll_interval = Duration::from_secs(
            std::env::var("PENDING_MONITOR_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.stale_after = Duration::from_secs(
            std::env::var("PENDING_MONITOR_STALE_AFTER_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.stale_after.as_secs()),
        );
        cfg.batch_size = parse_batch_size(
            std::env::var("PENDING_MONITOR_BATCH_SIZE").ok().as_deref(),
            cfg.batch_size,
        );
        cfg
    }
}

/// Batch size used as a SQL `LIMIT`, so never below one
fn parse_batch_size(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
        .max(1)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Surfaces transactions that never received a callback. Read only.
pub struct PendingTransactionMonitor {
    ledger: Arc<dyn TransactionLedger>,
    config: PendingMonitorConfig,
}

impl PendingTransactionMonitor {
    pub fn new(ledger: Arc<dyn TransactionLedger>, config: PendingMonitorConfig) -> Self {
        Self { ledger, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "pending transaction monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending transaction monitor stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "pending transaction monitor cycle failed");
                    }
                }
            }
        }

        info!("pending transaction monitor stopped");
    }

    /// Log every stale transaction and return how many were found
    pub async fn run_cycle(&self) -> Result<usize, MonitorError> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .map_err(|e| MonitorError::InvalidThreshold(e.to_string()))?;
        let now = Utc::now();

        let stale = self
            .ledger
            .find_stale_in_progress(now - stale_after, self.config.batch_size.max(1))
            .await?;

        for tx in &stale {
            let age_secs = (now - tx.timestamp).num_seconds();
            warn!(
                transaction_id = %tx.transaction_id,
                merchant_order_id = %tx.merchant_order_id,
                merchant_id = tx.merchant_id,
                payment_method = %tx.payment_method,
                age_secs,
                "⏳ Transaction still in progress, no callback received"
            );
        }

        if !stale.is_empty() {
            info!(count = stale.len(), "pending transaction scan complete");
        }
        Ok(stale.len())
    }
}
