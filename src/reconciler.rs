//! # Status Reconciliation
//!
//! A single periodic background loop that keeps observed status consistent
//! with actual worker liveness. Each tick scans the registry and levels any
//! fully drained task to `Stopped`: the only writer that completes an
//! asynchronous `Stopping` → `Stopped` transition, or declares a pool whose
//! workers all self-terminated.
//!
//! This is leveling, not an event-driven transition: an asynchronous stop may
//! be observed up to one period late. The loop is owned by the manager's
//! lifecycle and shuts down cleanly with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use crate::registry::TaskRegistry;

/// Periodic leveling loop over the registry.
pub struct StatusReconciler {
    id: Uuid,
    registry: Arc<TaskRegistry>,
    interval: Duration,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for StatusReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReconciler")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl StatusReconciler {
    pub(crate) fn new(registry: Arc<TaskRegistry>, interval: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            interval,
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the reconciliation loop. Must be called within a tokio runtime.
    pub(crate) fn spawn(&self) {
        let registry = Arc::clone(&self.registry);
        let shutdown = Arc::clone(&self.shutdown);
        let running = Arc::clone(&self.running);
        let interval = self.interval;
        let id = self.id;

        running.store(true, Ordering::Release);
        tokio::spawn(async move {
            debug!(reconciler_id = %id, ?interval, "🔄 RECONCILER: loop started");
            while running.load(Ordering::Acquire) {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        Self::tick(&registry);
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
            running.store(false, Ordering::Release);
            debug!(reconciler_id = %id, "RECONCILER: loop stopped");
        });
    }

    /// One reconciliation pass over every registered task.
    ///
    /// Only ever levels toward `Stopped`; desired multiplicity is untouched.
    fn tick(registry: &TaskRegistry) {
        for task in registry.snapshot() {
            if let Some(previous) = task.reconcile_to_stopped() {
                info!(
                    task_id = %task.id(),
                    previous = %previous,
                    "✅ RECONCILER: pool drained; leveled status to stopped"
                );
            }
        }
    }

    /// Stop the loop. Idempotent; safe to call from `Drop`.
    pub(crate) fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.shutdown.notify_waiters();
            debug!(reconciler_id = %self.id, "RECONCILER: shutdown requested");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
