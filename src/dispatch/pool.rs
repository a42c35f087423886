//! Dispatch worker pool
//!
//! N tokio tasks share one receiver. A worker holds the receiver lock only
//! while waiting for the next task, so callbacks run concurrently.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::executor::{DispatchContext, execute};
use super::{DispatchReceiver, DispatchTask};
use crate::error::DispatchError;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers (at least one) on the current runtime.
    pub fn spawn(ctx: Arc<DispatchContext>, receiver: DispatchReceiver, workers: usize) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = workers.max(1);
        info!(workers, "Starting dispatch workers");

        let handles = (0..workers)
            .map(|worker_id| {
                let ctx = ctx.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(task) = next else { break };
                        run_task(&ctx, task, worker_id).await;
                    }
                    debug!(worker_id, "Dispatch worker stopped");
                })
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for all workers; they exit once every sender is dropped and the
    /// queue is drained.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatch worker panicked");
            }
        }
    }
}

async fn run_task(ctx: &DispatchContext, task: DispatchTask, worker_id: usize) {
    debug!(worker_id, kind = %task.kind, record_id = %task.record_id, "Dispatching");
    match execute(ctx, task).await {
        Ok(()) => {}
        Err(DispatchError::Precondition(reason)) => {
            warn!(kind = %task.kind, record_id = %task.record_id, reason = %reason, "Dispatch aborted");
        }
        Err(e) => {
            warn!(
                kind = %task.kind,
                record_id = %task.record_id,
                version = %task.version,
                error = %e,
                "Callback failed, record left unchanged"
            );
        }
    }
}
