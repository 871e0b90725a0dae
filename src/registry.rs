//! # Task Registry
//!
//! Process-wide mapping from canonical task id to its [`ManagedTask`] record.
//! The registry enforces identity uniqueness and the configured capacity, and
//! is the exclusive owner of every record: entries are created by `register`
//! and destroyed by `unregister`, and a record is only ever reached through a
//! lookup here.
//!
//! Lookups and per-task operations go through a sharded map so operations on
//! different tasks never contend. Registration and unregistration additionally
//! serialize on a dedicated mutex, keeping the capacity invariant exact under
//! concurrent registration.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{PoolError, Result};
use crate::pool::{ManagedTask, PoolStatus};
use crate::task::{TaskArgs, Work};

/// Counts of registered tasks by status, plus total live workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_tasks: usize,
    pub running: usize,
    pub stopping: usize,
    pub stopped: usize,
    pub live_workers: usize,
}

/// Registry of all managed tasks.
pub struct TaskRegistry {
    tasks: DashMap<String, Arc<ManagedTask>>,
    /// Serializes register/unregister so the capacity check cannot race.
    membership: Mutex<()>,
    capacity: usize,
    max_workers: usize,
}

impl TaskRegistry {
    pub(crate) fn new(capacity: usize, max_workers: usize) -> Self {
        Self {
            tasks: DashMap::new(),
            membership: Mutex::new(()),
            capacity,
            max_workers,
        }
    }

    /// Create and store a record under `id`.
    ///
    /// Fails `AlreadyRegistered` on a duplicate id and `CapacityExceeded` when
    /// the registry is full. The new task starts `Stopped` with multiplicity 0
    /// and every slot empty.
    pub(crate) fn register(
        &self,
        id: String,
        work: Arc<dyn Work>,
        args: TaskArgs,
    ) -> Result<Arc<ManagedTask>> {
        let _membership = self.membership.lock();

        if self.tasks.contains_key(&id) {
            return Err(PoolError::AlreadyRegistered { id });
        }
        if self.tasks.len() >= self.capacity {
            return Err(PoolError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let task = ManagedTask::new(id.clone(), work, args, self.max_workers);
        self.tasks.insert(id.clone(), Arc::clone(&task));
        info!(task_id = %id, total = self.tasks.len(), "REGISTRY: task registered");
        Ok(task)
    }

    /// Remove the record under `id`.
    ///
    /// Refuses with `Busy` while the task still has (or may still have) live
    /// workers; the record is retired under its own state lock before the map
    /// entry disappears, so no worker is ever orphaned by a racing start.
    pub(crate) fn unregister(&self, id: &str) -> Result<()> {
        let _membership = self.membership.lock();

        let task = self.get(id)?;
        task.retire()?;
        self.tasks.remove(id);
        info!(task_id = %id, total = self.tasks.len(), "REGISTRY: task unregistered");
        Ok(())
    }

    /// Look up a record by id.
    pub(crate) fn get(&self, id: &str) -> Result<Arc<ManagedTask>> {
        self.tasks
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PoolError::NotFound { id: id.to_string() })
    }

    /// Snapshot of every record, for reconciliation and shutdown sweeps.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ManagedTask>> {
        self.tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Aggregate counts across all registered tasks.
    pub(crate) fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.tasks.iter() {
            // A record mid-unregistration reports NotFound; skip it.
            let Ok(info) = entry.value().info() else {
                continue;
            };
            stats.total_tasks += 1;
            stats.live_workers += info.live_workers;
            match info.status {
                PoolStatus::Running => stats.running += 1,
                PoolStatus::Stopping => stats.stopping += 1,
                PoolStatus::Stopped => stats.stopped += 1,
            }
        }
        debug!(
            total = stats.total_tasks,
            running = stats.running,
            live_workers = stats.live_workers,
            "REGISTRY: stats collected"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::work_fn;

    fn idle_work() -> Arc<dyn Work> {
        Arc::new(work_fn(|ctx: crate::worker::WorkerContext, _args| {
            async move {
                ctx.cancelled().await;
            }
        }))
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = TaskRegistry::new(4, 8);
        registry
            .register("ns/a".to_string(), idle_work(), Vec::new())
            .unwrap();

        let task = registry.get("ns/a").unwrap();
        assert_eq!(task.id(), "ns/a");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = TaskRegistry::new(4, 8);
        registry
            .register("ns/a".to_string(), idle_work(), Vec::new())
            .unwrap();

        let err = registry
            .register("ns/a".to_string(), idle_work(), Vec::new())
            .unwrap_err();
        assert_eq!(
            err,
            PoolError::AlreadyRegistered {
                id: "ns/a".to_string()
            }
        );
        // The original registration is unaffected.
        assert!(registry.get("ns/a").is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let registry = TaskRegistry::new(2, 8);
        registry
            .register("ns/a".to_string(), idle_work(), Vec::new())
            .unwrap();
        registry
            .register("ns/b".to_string(), idle_work(), Vec::new())
            .unwrap();

        let err = registry
            .register("ns/c".to_string(), idle_work(), Vec::new())
            .unwrap_err();
        assert_eq!(err, PoolError::CapacityExceeded { capacity: 2 });

        // Unregistering frees a slot.
        registry.unregister("ns/a").unwrap();
        assert!(registry
            .register("ns/c".to_string(), idle_work(), Vec::new())
            .is_ok());
    }

    #[tokio::test]
    async fn unregister_unknown_id_is_not_found() {
        let registry = TaskRegistry::new(4, 8);
        assert!(matches!(
            registry.unregister("ns/ghost"),
            Err(PoolError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unregister_refuses_running_task() {
        let registry = TaskRegistry::new(4, 8);
        let task = registry
            .register("ns/live".to_string(), idle_work(), Vec::new())
            .unwrap();
        task.start(2, Vec::new()).unwrap();

        assert!(matches!(
            registry.unregister("ns/live"),
            Err(PoolError::Busy { .. })
        ));
        // Still registered and still running.
        assert_eq!(
            registry.get("ns/live").unwrap().status().unwrap(),
            PoolStatus::Running
        );

        task.stop(crate::pool::StopMode::Wait, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        registry.unregister("ns/live").unwrap();
        assert!(matches!(
            registry.get("ns/live"),
            Err(PoolError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let registry = TaskRegistry::new(4, 8);
        let a = registry
            .register("ns/a".to_string(), idle_work(), Vec::new())
            .unwrap();
        registry
            .register("ns/b".to_string(), idle_work(), Vec::new())
            .unwrap();
        a.start(3, Vec::new()).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.stopped, 1);
        assert_eq!(stats.live_workers, 3);

        a.stop(crate::pool::StopMode::Wait, std::time::Duration::from_secs(1))
            .await
            .unwrap();
    }
}
