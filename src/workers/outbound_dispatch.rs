//! Drains the outbound queue. Each job is attempted once; failures are logged
//! and dropped. At most `max_in_flight` deliveries run at a time.
//!
//! On shutdown the queue is closed and everything already accepted is still
//! delivered before `run` returns.

use crate::payments::providers::BankGatewayClient;
use crate::services::dispatcher::OutboundJob;
use crate::services::notification::WebshopNotifier;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

pub struct OutboundDispatchWorker {
    rx: mpsc::Receiver<OutboundJob>,
    bank: Arc<BankGatewayClient>,
    notifier: Arc<WebshopNotifier>,
    max_in_flight: usize,
}

impl OutboundDispatchWorker {
    pub fn new(
        rx: mpsc::Receiver<OutboundJob>,
        bank: Arc<BankGatewayClient>,
        notifier: Arc<WebshopNotifier>,
    ) -> Self {
        Self {
            rx,
            bank,
            notifier,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(max_in_flight = self.max_in_flight, "outbound dispatch worker started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("outbound dispatch worker stopping");
                        break;
                    }
                }
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(done);
                }
                job = self.rx.recv(), if in_flight.len() < self.max_in_flight => {
                    match job {
                        Some(job) => self.spawn(&mut in_flight, job),
                        None => {
                            info!("outbound queue closed");
                            break;
                        }
                    }
                }
            }
        }

        // Refuse new jobs, then deliver what was already accepted
        self.rx.close();
        let mut drained = 0usize;
        while let Some(job) = self.rx.recv().await {
            while in_flight.len() >= self.max_in_flight {
                match in_flight.join_next().await {
                    Some(done) => log_join(done),
                    None => break,
                }
            }
            self.spawn(&mut in_flight, job);
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "delivering jobs queued before shutdown");
        }
        while let Some(done) = in_flight.join_next().await {
            log_join(done);
        }

        info!("outbound dispatch worker stopped");
    }

    fn spawn(&self, in_flight: &mut JoinSet<()>, job: OutboundJob) {
        in_flight.spawn(deliver(job, self.bank.clone(), self.notifier.clone()));
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "outbound delivery task panicked");
    }
}

async fn deliver(job: OutboundJob, bank: Arc<BankGatewayClient>, notifier: Arc<WebshopNotifier>) {
    let kind = job.kind();
    let merchant_order_id = job.merchant_order_id();

    let result = match &job {
        OutboundJob::BankPayment(request) => bank.submit(request).await,
        OutboundJob::WebshopNotification(notification) => {
            notifier.send_notification(notification).await
        }
    };

    if let Err(e) = result {
        error!(kind, %merchant_order_id, error = %e, "outbound job failed, dropped");
    }
}
