//! # Managed Tasks and Pool Control
//!
//! This module holds the per-task record ([`ManagedTask`]) and the pool
//! controller operations: starting a pool at a given multiplicity, resizing it
//! up or down at runtime, and stopping it with cancellation fan-out.
//!
//! ## Slots
//!
//! Each task owns a fixed-capacity slot vector of length
//! `max_workers_per_task`. An occupied slot holds the cancellation handle of
//! one live worker. Spawn fills ascending empty indices; shrink cancels the
//! highest occupied indices first, preserving the low-index core of the pool.
//! Cancellation is a request: a slot is cleared only by its own worker on
//! exit, so a shrink or stop returns as soon as the signals are sent.
//!
//! ## Status
//!
//! `Running` while workers occupy slots, `Stopping` between a stop request and
//! full drain, `Stopped` when every slot is empty. Synchronous transitions
//! happen inline; asynchronous drains are finalized by the
//! [`StatusReconciler`](crate::reconciler::StatusReconciler).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PoolError, Result};
use crate::task::{TaskArgs, Work};
use crate::worker::spawn_worker;

/// How often a synchronous stop re-checks slot occupancy while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Observable lifecycle state of a task's worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Running,
    Stopping,
    Stopped,
}

impl PoolStatus {
    pub fn name(&self) -> &'static str {
        match self {
            PoolStatus::Running => "running",
            PoolStatus::Stopping => "stopping",
            PoolStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How `stop` treats workers that are still draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Signal cancellation, then wait (bounded) until every slot is empty.
    Wait,
    /// Signal cancellation and return immediately; the reconciler finalizes
    /// the `Stopping` → `Stopped` transition once workers drain.
    NoWait,
}

/// Point-in-time snapshot of one managed task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: String,
    pub status: PoolStatus,
    pub desired_multiplicity: usize,
    pub live_workers: usize,
    pub registered_at: DateTime<Utc>,
}

/// Mutable pool state, guarded by the task's mutex.
///
/// The lock is only ever held for short, non-awaiting sections; every
/// read-modify-write of `status`, `desired`, and `slots` serializes here.
struct PoolState {
    status: PoolStatus,
    desired: usize,
    args: Arc<TaskArgs>,
    slots: Vec<Option<CancellationToken>>,
    /// Set during unregistration so callers still holding the `Arc` observe
    /// `NotFound` instead of operating on a record the registry no longer
    /// reaches.
    retired: bool,
}

impl PoolState {
    fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn all_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    fn ensure_registered(&self, id: &str) -> Result<()> {
        if self.retired {
            return Err(PoolError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

/// The per-task record: work function, argument binding, slot vector, status.
///
/// Owned exclusively by the registry; handed out as `Arc` only for the
/// duration of one operation or to the workers it spawned.
pub struct ManagedTask {
    id: Arc<str>,
    work: Arc<dyn Work>,
    registered_at: DateTime<Utc>,
    max_workers: usize,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for ManagedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManagedTask")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("desired", &state.desired)
            .field("occupied", &state.occupied())
            .finish()
    }
}

impl ManagedTask {
    pub(crate) fn new(
        id: String,
        work: Arc<dyn Work>,
        args: TaskArgs,
        max_workers: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Arc::from(id),
            work,
            registered_at: Utc::now(),
            max_workers,
            state: Mutex::new(PoolState {
                status: PoolStatus::Stopped,
                desired: 0,
                args: Arc::new(args),
                slots: vec![None; max_workers],
                retired: false,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub(crate) fn work(&self) -> Arc<dyn Work> {
        Arc::clone(&self.work)
    }

    /// Start the pool at `multiplicity`, binding `args` for all workers.
    ///
    /// Idempotent on a running pool. Fails `Busy` while a stop is draining and
    /// `InvalidMultiplicity` unless `0 < multiplicity <= max_workers_per_task`.
    /// Returns once every worker is launched; never waits on work completion.
    pub(crate) fn start(self: &Arc<Self>, multiplicity: usize, args: TaskArgs) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_registered(&self.id)?;

        match state.status {
            PoolStatus::Running => {
                debug!(task_id = %self.id, "start is a no-op: pool already running");
                return Ok(());
            }
            PoolStatus::Stopping => {
                return Err(PoolError::Busy {
                    id: self.id.to_string(),
                    reason: "a stop is still draining; retry once it completes".to_string(),
                });
            }
            PoolStatus::Stopped => {}
        }

        if multiplicity == 0 || multiplicity > self.max_workers {
            return Err(PoolError::InvalidMultiplicity {
                requested: multiplicity,
                max: self.max_workers,
            });
        }

        state.args = Arc::new(args);
        let spawned = self.fill_slots(&mut state, multiplicity);
        state.desired = multiplicity;
        state.status = PoolStatus::Running;

        info!(task_id = %self.id, multiplicity = spawned, "🚀 POOL: started worker pool");
        Ok(())
    }

    /// Resize the pool to `new` workers.
    ///
    /// On a stopped pool this only records the desired multiplicity. On a
    /// running pool it spawns into ascending empty slots (reusing the bound
    /// args) or cancels the highest occupied slots down to `new`; shrink
    /// returns once the cancellation signals are sent.
    pub(crate) fn change_multiplicity(self: &Arc<Self>, new: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_registered(&self.id)?;

        if new > self.max_workers {
            return Err(PoolError::InvalidMultiplicity {
                requested: new,
                max: self.max_workers,
            });
        }

        match state.status {
            PoolStatus::Stopping => Err(PoolError::Busy {
                id: self.id.to_string(),
                reason: "a stop is still draining; retry once it completes".to_string(),
            }),
            PoolStatus::Stopped => {
                state.desired = new;
                debug!(
                    task_id = %self.id,
                    desired = new,
                    "recorded multiplicity on stopped pool without starting it"
                );
                Ok(())
            }
            PoolStatus::Running => {
                let current = state.desired;
                if new > current {
                    let wanted = new - current;
                    let spawned = self.fill_slots(&mut state, wanted);
                    if spawned < wanted {
                        warn!(
                            task_id = %self.id,
                            wanted,
                            spawned,
                            "🔼 POOL: no empty slots for part of the grow; draining workers still occupy them"
                        );
                    }
                    info!(task_id = %self.id, from = current, to = new, "🔼 POOL: grew worker pool");
                } else if new < current {
                    let cancelled = cancel_slots_from(&mut state, new);
                    info!(
                        task_id = %self.id,
                        from = current,
                        to = new,
                        cancelled,
                        "🔽 POOL: shrinking worker pool; excess workers drain asynchronously"
                    );
                }
                state.desired = new;
                Ok(())
            }
        }
    }

    /// Stop the pool: cancel every occupied slot and mark it `Stopping`.
    ///
    /// No-op success if already stopping or stopped. With [`StopMode::Wait`]
    /// the call blocks until every slot drains (bounded by `timeout`, failing
    /// `ShutdownTimeout` and leaving the pool visibly `Stopping` if workers
    /// never acknowledge). With [`StopMode::NoWait`] it returns after
    /// signaling and the reconciler completes the transition.
    pub(crate) async fn stop(self: &Arc<Self>, mode: StopMode, timeout: Duration) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.ensure_registered(&self.id)?;

            match state.status {
                PoolStatus::Stopping | PoolStatus::Stopped => {
                    debug!(task_id = %self.id, status = %state.status, "stop is a no-op");
                    return Ok(());
                }
                PoolStatus::Running => {}
            }

            let signalled = cancel_slots_from(&mut state, 0);
            state.status = PoolStatus::Stopping;
            info!(task_id = %self.id, signalled, "🛑 POOL: cancellation sent to all workers");
        }

        match mode {
            StopMode::NoWait => Ok(()),
            StopMode::Wait => self.await_drained(timeout).await,
        }
    }

    /// Wait (bounded) for every slot to empty, then finalize `Stopped`.
    async fn await_drained(&self, timeout: Duration) -> Result<()> {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                {
                    let mut state = self.state.lock();
                    if state.all_empty() {
                        state.status = PoolStatus::Stopped;
                        return;
                    }
                }
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!(task_id = %self.id, "✅ POOL: all workers drained");
                Ok(())
            }
            Err(_) => {
                warn!(
                    task_id = %self.id,
                    ?timeout,
                    "⚠️ POOL: workers did not drain in time; pool remains in stopping state"
                );
                Err(PoolError::ShutdownTimeout {
                    id: self.id.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// Current status. Pure read.
    pub(crate) fn status(&self) -> Result<PoolStatus> {
        let state = self.state.lock();
        state.ensure_registered(&self.id)?;
        Ok(state.status)
    }

    /// Current desired multiplicity. Pure read.
    pub(crate) fn multiplicity(&self) -> Result<usize> {
        let state = self.state.lock();
        state.ensure_registered(&self.id)?;
        Ok(state.desired)
    }

    /// Snapshot of the task's observable state. Pure read.
    pub(crate) fn info(&self) -> Result<TaskInfo> {
        let state = self.state.lock();
        state.ensure_registered(&self.id)?;
        Ok(TaskInfo {
            id: self.id.to_string(),
            status: state.status,
            desired_multiplicity: state.desired,
            live_workers: state.occupied(),
            registered_at: self.registered_at,
        })
    }

    /// Called by a worker on exit to release its own slot.
    ///
    /// No other actor may clear a slot it did not spawn; status is not touched
    /// here, the reconciler (or a waiting synchronous stop) levels it.
    pub(crate) fn clear_slot(&self, slot: usize) {
        let mut state = self.state.lock();
        state.slots[slot] = None;
        if state.all_empty() {
            debug!(task_id = %self.id, "last worker exited; pool is drained");
        }
    }

    /// Level status to `Stopped` if every slot is empty.
    ///
    /// Returns the previous status when a transition happened. Never flips a
    /// task out of `Stopped` and never touches the desired multiplicity.
    pub(crate) fn reconcile_to_stopped(&self) -> Option<PoolStatus> {
        let mut state = self.state.lock();
        if state.status == PoolStatus::Stopped || !state.all_empty() {
            return None;
        }
        let previous = state.status;
        state.status = PoolStatus::Stopped;
        Some(previous)
    }

    /// Mark the task as removed from the registry.
    ///
    /// Refuses with `Busy` unless the pool is `Stopped`, so live workers can
    /// never be orphaned by unregistration.
    pub(crate) fn retire(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_registered(&self.id)?;
        if state.status != PoolStatus::Stopped {
            return Err(PoolError::Busy {
                id: self.id.to_string(),
                reason: format!("cannot unregister while {}", state.status),
            });
        }
        state.retired = true;
        Ok(())
    }

    /// Spawn up to `count` workers into ascending empty slots.
    ///
    /// Caller holds the state lock; tokens are stored before the workers are
    /// spawned so a slot is never observed empty while its worker lives.
    fn fill_slots(self: &Arc<Self>, state: &mut PoolState, count: usize) -> usize {
        let args = Arc::clone(&state.args);
        let mut spawned = 0;
        for slot in 0..state.slots.len() {
            if spawned == count {
                break;
            }
            if state.slots[slot].is_some() {
                continue;
            }
            let token = CancellationToken::new();
            state.slots[slot] = Some(token.clone());
            spawn_worker(self, slot, token, Arc::clone(&args));
            spawned += 1;
        }
        spawned
    }
}

/// Cancel every occupied slot at index `floor` or above, highest first.
///
/// Slots are not cleared; each worker clears its own on exit. Returns the
/// number of cancellation signals sent.
fn cancel_slots_from(state: &mut PoolState, floor: usize) -> usize {
    let mut cancelled = 0;
    for slot in (floor..state.slots.len()).rev() {
        if let Some(token) = &state.slots[slot] {
            token.cancel();
            cancelled += 1;
        }
    }
    cancelled
}
