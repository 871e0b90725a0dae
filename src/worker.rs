//! # Worker Execution Context
//!
//! One worker is one spawned tokio task running a single invocation of the
//! task's [`Work`](crate::task::Work) function. Each worker owns an
//! independent [`CancellationToken`]; cancelling it is a one-shot, idempotent
//! request that the work function must observe. There is no forced-kill path.
//!
//! A worker is never addressed by identity, only by its slot position. On
//! exit, whether natural or after acknowledging cancellation, the worker
//! clears its own slot.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::pool::ManagedTask;
use crate::task::TaskArgs;

/// Per-worker execution context handed to the work function.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    task_id: Arc<str>,
    slot: usize,
    token: CancellationToken,
}

impl WorkerContext {
    pub(crate) fn new(task_id: Arc<str>, slot: usize, token: CancellationToken) -> Self {
        Self {
            task_id,
            slot,
            token,
        }
    }

    /// Canonical id of the task this worker belongs to.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Slot index this worker occupies within its task's pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether cancellation has been requested for this worker.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once cancellation is requested for this worker.
    ///
    /// Intended for use in `tokio::select!` inside the work function.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Launch one worker occupying `slot`.
///
/// The caller has already stored `token` in the slot; the spawned task runs
/// the work function to completion and then clears the slot itself. Spawned,
/// never awaited: launch is complete once the task is handed to the runtime.
pub(crate) fn spawn_worker(
    task: &Arc<ManagedTask>,
    slot: usize,
    token: CancellationToken,
    args: Arc<TaskArgs>,
) {
    let task = Arc::clone(task);
    tokio::spawn(async move {
        let ctx = WorkerContext::new(task.id_arc(), slot, token);
        trace!(task_id = %ctx.task_id(), slot, "worker started");
        task.work().run(ctx, args).await;
        task.clear_slot(slot);
        trace!(task_id = %task.id(), slot, "worker exited and cleared its slot");
    });
}
