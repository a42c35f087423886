//! Callback Dispatcher
//!
//! Transitions that notify the partner (AGREED, FINALIZED, STARTED) are
//! queued as plain [`DispatchTask`]s. A [`WorkerPool`] drains the queue and
//! runs [`execute`] for each task: re-read the record, check its state,
//! build the message, POST it, advance the record.
//!
//! Delivery is at-most-once. A failed POST is logged and the record stays
//! where it was.

pub mod client;
pub mod executor;
pub mod pool;

pub use client::{HttpPartnerClient, PartnerClient};
pub use executor::{DispatchContext, execute};
pub use pool::WorkerPool;

use std::fmt;
use tokio::sync::mpsc;
use tracing::error;

use crate::codec::ProtocolVersion;
use crate::core_types::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Mint the contract id and push the agreement
    Agreed,
    /// Push the FINALIZED event after verification
    Finalized,
    /// Push the transfer start with data address and token
    Started,
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchKind::Agreed => "AGREED",
            DispatchKind::Finalized => "FINALIZED",
            DispatchKind::Started => "STARTED",
        };
        write!(f, "{}", s)
    }
}

/// One outbound callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTask {
    pub kind: DispatchKind,
    /// Negotiation or transfer own pid
    pub record_id: ProcessId,
    /// Wire format of the outbound message
    pub version: ProtocolVersion,
}

impl DispatchTask {
    pub fn new(kind: DispatchKind, record_id: ProcessId, version: ProtocolVersion) -> Self {
        Self {
            kind,
            record_id,
            version,
        }
    }
}

/// Producer side, held by the protocol handlers.
#[derive(Clone)]
pub struct DispatchSender {
    tx: mpsc::Sender<DispatchTask>,
}

impl DispatchSender {
    /// Queue a task. Waits only for queue capacity, never for partner I/O.
    pub async fn enqueue(&self, task: DispatchTask) -> bool {
        match self.tx.send(task).await {
            Ok(()) => true,
            Err(_) => {
                error!(
                    kind = %task.kind,
                    record_id = %task.record_id,
                    "Dispatch queue closed, callback dropped"
                );
                false
            }
        }
    }
}

/// Consumer side, owned by the worker pool.
pub struct DispatchReceiver {
    rx: mpsc::Receiver<DispatchTask>,
}

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<DispatchTask> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DispatchTask> {
        self.rx.try_recv().ok()
    }
}

/// Create a bounded dispatch queue.
pub fn dispatch_channel(buffer: usize) -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(buffer);
    (DispatchSender { tx }, DispatchReceiver { rx })
}
