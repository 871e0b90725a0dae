#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Taskpool
//!
//! Runtime worker-pool manager: register a task (a unit of repeatable work)
//! once, then dynamically control how many concurrent instances of it execute,
//! without restarting the process. Built for long-running tokio services
//! that rebalance internal concurrency (e.g., the number of consumer workers)
//! in response to load.
//!
//! ## Architecture
//!
//! A [`TaskPoolManager`] owns a registry of managed tasks. Each task holds a
//! fixed-capacity slot vector; every occupied slot is one live worker with its
//! own cancellation token. Pool control (start, resize, stop) mutates slots
//! under per-task locking; a single background reconciliation loop levels each
//! task's observed status against actual worker liveness.
//!
//! Cancellation is strictly cooperative: shrinking a pool or stopping it sends
//! a one-shot signal to each affected worker, and the worker's own work
//! function must observe it. A worker that never acknowledges leaves its task
//! visibly stuck in `Stopping`, never silently failed.
//!
//! ## Module Organization
//!
//! - [`manager`] - Public API façade ([`TaskPoolManager`])
//! - [`registry`] - Id → task mapping, uniqueness and capacity enforcement
//! - [`pool`] - Per-task record and pool-control operations
//! - [`worker`] - Worker execution context and cancellation handles
//! - [`reconciler`] - Periodic status leveling loop
//! - [`task`] - Task identity, addressing, and the [`Work`] seam
//! - [`config`] - Process-wide limits and cadences
//! - [`error`] - Structured error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskpool::{work_fn, StopMode, TaskArgs, TaskDescriptor, TaskPoolConfig, TaskPoolManager, WorkerContext};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = TaskPoolManager::new(TaskPoolConfig::default())?;
//!
//! let consumer = work_fn(|ctx: WorkerContext, _args: Arc<TaskArgs>| async move {
//!     loop {
//!         tokio::select! {
//!             _ = ctx.cancelled() => break,
//!             _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {
//!                 // poll a queue, handle one message, ...
//!             }
//!         }
//!     }
//! });
//!
//! let id = manager.register(TaskDescriptor::new("billing", "invoice_consumer"), consumer, Vec::new())?;
//!
//! manager.start(id.as_str(), 5, Vec::new())?;       // 5 concurrent workers
//! manager.change_multiplicity(id.as_str(), 2)?;     // drain down to 2 at runtime
//! manager.stop(id.as_str(), StopMode::Wait).await?; // cancel and wait for drain
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod pool;
pub mod reconciler;
pub mod registry;
pub mod task;
pub mod worker;

pub use config::TaskPoolConfig;
pub use error::{PoolError, Result};
pub use manager::TaskPoolManager;
pub use pool::{PoolStatus, StopMode, TaskInfo};
pub use registry::RegistryStats;
pub use task::{
    work_fn, DescriptorKeyResolver, IdentityResolver, TaskArgs, TaskDescriptor, TaskRef, Work,
    WorkFn,
};
pub use worker::WorkerContext;
