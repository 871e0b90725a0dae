//! # Task Pool Manager
//!
//! The public façade over the registry and the pool controller. One manager is
//! constructed at process startup, owns the registry and the status
//! reconciliation loop, and is shared (by reference or `Arc`) with every
//! caller that registers or controls tasks.
//!
//! All operations accept either a [`TaskDescriptor`] or the identifier a
//! registration returned, via `impl Into<TaskRef>`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::TaskPoolConfig;
use crate::error::Result;
use crate::pool::{ManagedTask, PoolStatus, StopMode, TaskInfo};
use crate::reconciler::StatusReconciler;
use crate::registry::{RegistryStats, TaskRegistry};
use crate::task::{DescriptorKeyResolver, IdentityResolver, TaskArgs, TaskDescriptor, TaskRef, Work};

/// Runtime worker-pool manager.
///
/// Register a task once, then start, resize, and stop its pool of concurrent
/// workers at runtime. See the crate-level documentation for a usage example.
pub struct TaskPoolManager {
    config: TaskPoolConfig,
    registry: Arc<TaskRegistry>,
    resolver: Arc<dyn IdentityResolver>,
    reconciler: StatusReconciler,
}

impl std::fmt::Debug for TaskPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPoolManager")
            .field("config", &self.config)
            .field("tasks", &self.registry.len())
            .field("reconciler", &self.reconciler)
            .finish()
    }
}

impl TaskPoolManager {
    /// Create a manager with the default identity resolver and spawn its
    /// reconciliation loop. Must be called within a tokio runtime.
    pub fn new(config: TaskPoolConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::new(DescriptorKeyResolver))
    }

    /// Create a manager with a custom [`IdentityResolver`].
    pub fn with_resolver(
        config: TaskPoolConfig,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(TaskRegistry::new(
            config.max_tasks,
            config.max_workers_per_task,
        ));
        let reconciler = StatusReconciler::new(Arc::clone(&registry), config.reconcile_interval());
        reconciler.spawn();

        info!(
            max_tasks = config.max_tasks,
            max_workers_per_task = config.max_workers_per_task,
            reconcile_interval_ms = config.reconcile_interval_ms,
            "🏗️ MANAGER: task pool manager created"
        );

        Ok(Self {
            config,
            registry,
            resolver,
            reconciler,
        })
    }

    /// Register `work` under the descriptor's canonical identity.
    ///
    /// Returns the identifier every other operation accepts. `args` is the
    /// initial argument binding; a later [`start`](Self::start) rebinds it.
    /// The new task is `Stopped` with multiplicity 0 until started.
    pub fn register<W: Work>(
        &self,
        descriptor: TaskDescriptor,
        work: W,
        args: TaskArgs,
    ) -> Result<String> {
        let id = self.resolver.resolve(&descriptor);
        self.registry.register(id.clone(), Arc::new(work), args)?;
        Ok(id)
    }

    /// Remove a task from the registry.
    ///
    /// Refuses with `Busy` while the task is `Running` or `Stopping`; stop the
    /// pool first. This keeps live workers from being orphaned with no
    /// addressable record.
    pub fn unregister(&self, target: impl Into<TaskRef>) -> Result<()> {
        let id = self.resolve(target);
        self.registry.unregister(&id)
    }

    /// Start a task's pool with exactly `multiplicity` workers bound to `args`.
    ///
    /// Idempotent success on a running pool; `Busy` while a stop drains;
    /// `InvalidMultiplicity` unless `0 < multiplicity <= max_workers_per_task`.
    /// Returns once all workers are launched, never when they complete.
    pub fn start(
        &self,
        target: impl Into<TaskRef>,
        multiplicity: usize,
        args: TaskArgs,
    ) -> Result<()> {
        self.task(target)?.start(multiplicity, args)
    }

    /// Resize a task's pool to `multiplicity` workers.
    ///
    /// On a stopped pool only the desired multiplicity is recorded. Growing a
    /// running pool spawns workers with the existing argument binding;
    /// shrinking sends cancellation to the excess workers and returns without
    /// waiting for them to exit.
    pub fn change_multiplicity(
        &self,
        target: impl Into<TaskRef>,
        multiplicity: usize,
    ) -> Result<()> {
        self.task(target)?.change_multiplicity(multiplicity)
    }

    /// Stop a task's pool.
    ///
    /// [`StopMode::Wait`] blocks until every worker has drained, bounded by
    /// the configured stop timeout (`ShutdownTimeout` on expiry).
    /// [`StopMode::NoWait`] returns right after cancellation is signalled; the
    /// reconciler finalizes the stop within one period of the drain.
    pub async fn stop(&self, target: impl Into<TaskRef>, mode: StopMode) -> Result<()> {
        self.task(target)?
            .stop(mode, self.config.stop_timeout())
            .await
    }

    /// Current status of a task. Pure read.
    pub fn status(&self, target: impl Into<TaskRef>) -> Result<PoolStatus> {
        self.task(target)?.status()
    }

    /// Current desired multiplicity of a task. Pure read.
    pub fn multiplicity(&self, target: impl Into<TaskRef>) -> Result<usize> {
        self.task(target)?.multiplicity()
    }

    /// Snapshot of one task's observable state. Pure read.
    pub fn task_info(&self, target: impl Into<TaskRef>) -> Result<TaskInfo> {
        self.task(target)?.info()
    }

    /// Snapshots of every registered task.
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        self.registry
            .snapshot()
            .iter()
            .filter_map(|task| task.info().ok())
            .collect()
    }

    /// Aggregate registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &TaskPoolConfig {
        &self.config
    }

    /// Stop every pool (waiting for drains, bounded per task) and shut the
    /// reconciliation loop down.
    ///
    /// All pools are attempted even if some time out; the first failure is
    /// returned after the sweep completes.
    pub async fn shutdown(&self) -> Result<()> {
        info!("🛑 MANAGER: shutting down all pools");

        let timeout = self.config.stop_timeout();
        let tasks = self.registry.snapshot();
        let stops = tasks
            .iter()
            .map(|task| task.stop(StopMode::Wait, timeout));
        let results = futures::future::join_all(stops).await;

        self.reconciler.shutdown();

        let mut first_error = None;
        for (task, result) in tasks.iter().zip(results) {
            if let Err(e) = result {
                warn!(task_id = %task.id(), error = %e, "⚠️ MANAGER: pool did not stop cleanly");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => {
                info!("✅ MANAGER: shutdown complete");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    fn resolve(&self, target: impl Into<TaskRef>) -> String {
        match target.into() {
            TaskRef::Id(id) => id,
            TaskRef::Descriptor(descriptor) => self.resolver.resolve(&descriptor),
        }
    }

    fn task(&self, target: impl Into<TaskRef>) -> Result<Arc<ManagedTask>> {
        let id = self.resolve(target);
        self.registry.get(&id)
    }
}

impl Drop for TaskPoolManager {
    fn drop(&mut self) {
        // The reconciliation loop does not exit on its own.
        self.reconciler.shutdown();
    }
}
