//! Outbound task queue for hops that do not shape the caller's response.
//!
//! Delivery is at most once: jobs are never retried, and a full or closed
//! queue drops the job with a warning.

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppErrorKind, InfrastructureError};
use crate::payments::types::{BankPaymentRequest, WebshopNotification};

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundJob {
    /// Card instrument for the bank gateway
    BankPayment(BankPaymentRequest),
    /// Final outcome for the webshop
    WebshopNotification(WebshopNotification),
}

impl OutboundJob {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundJob::BankPayment(_) => "bank_payment",
            OutboundJob::WebshopNotification(_) => "webshop_notification",
        }
    }

    pub fn merchant_order_id(&self) -> Uuid {
        match self {
            OutboundJob::BankPayment(request) => request.merchant_order_id,
            OutboundJob::WebshopNotification(notification) => notification.merchant_order_id,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("outbound queue is full")]
    QueueFull,

    #[error("outbound queue is closed")]
    QueueClosed,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Dispatch {
            message: err.to_string(),
        }))
    }
}

/// Sending half of the outbound queue. Cheap to clone.
#[derive(Clone)]
pub struct OutboundDispatcher {
    tx: mpsc::Sender<OutboundJob>,
}

impl OutboundDispatcher {
    /// Create the queue; the receiver goes to the dispatch worker
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn try_submit(&self, job: OutboundJob) -> Result<(), DispatchError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::QueueClosed,
        })
    }

    /// Fire and forget. Returns whether the job was queued.
    pub fn submit(&self, job: OutboundJob) -> bool {
        let kind = job.kind();
        let merchant_order_id = job.merchant_order_id();
        match self.try_submit(job) {
            Ok(()) => {
                debug!(kind, %merchant_order_id, "outbound job queued");
                true
            }
            Err(e) => {
                warn!(kind, %merchant_order_id, error = %e, "outbound job dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots left in the queue
    pub fn available_capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
