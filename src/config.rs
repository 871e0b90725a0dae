//! # Pool Manager Configuration
//!
//! Configuration for the task pool manager: registry capacity, per-task worker
//! limits, reconciliation cadence, and the synchronous stop bound. Values can
//! come from code (`TaskPoolConfig::default()` plus struct update), from a
//! config file, or from `TASKPOOL_`-prefixed environment variables layered on
//! top of the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PoolError, Result};

/// Default maximum number of distinct registered tasks.
pub const DEFAULT_MAX_TASKS: usize = 512;

/// Default maximum number of concurrent workers per task.
pub const DEFAULT_MAX_WORKERS_PER_TASK: usize = 128;

/// Default status reconciliation period in milliseconds.
pub const DEFAULT_RECONCILE_INTERVAL_MS: u64 = 3_000;

/// Default bound on a synchronous stop, in milliseconds.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 30_000;

/// Process-wide settings for a [`TaskPoolManager`](crate::manager::TaskPoolManager).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskPoolConfig {
    /// Maximum number of distinct tasks the registry will hold.
    pub max_tasks: usize,
    /// Maximum worker multiplicity any single task may be started or resized to.
    pub max_workers_per_task: usize,
    /// Period of the background status reconciliation loop.
    pub reconcile_interval_ms: u64,
    /// How long a synchronous stop waits for workers to drain before giving up.
    pub stop_timeout_ms: u64,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            max_workers_per_task: DEFAULT_MAX_WORKERS_PER_TASK,
            reconcile_interval_ms: DEFAULT_RECONCILE_INTERVAL_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl TaskPoolConfig {
    /// Reconciliation period as a [`Duration`].
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// Synchronous stop bound as a [`Duration`].
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Check the configuration for values that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks == 0 {
            return Err(PoolError::Configuration(
                "max_tasks must be at least 1".to_string(),
            ));
        }
        if self.max_workers_per_task == 0 {
            return Err(PoolError::Configuration(
                "max_workers_per_task must be at least 1".to_string(),
            ));
        }
        if self.reconcile_interval_ms == 0 {
            return Err(PoolError::Configuration(
                "reconcile_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.stop_timeout_ms == 0 {
            return Err(PoolError::Configuration(
                "stop_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from `TASKPOOL_`-prefixed environment variables only.
    pub fn load() -> Result<Self> {
        Self::load_layered(None)
    }

    /// Load configuration from a file, with environment variables layered on top.
    ///
    /// The file format is inferred from the extension (TOML, YAML, or JSON,
    /// whatever the `config` crate recognizes).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::load_layered(Some(path))
    }

    fn load_layered(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "loading task pool configuration file");
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        let merged = builder
            .add_source(config::Environment::with_prefix("TASKPOOL").try_parsing(true))
            .build()
            .map_err(|e| PoolError::Configuration(e.to_string()))?;

        let loaded: TaskPoolConfig = merged
            .try_deserialize()
            .map_err(|e| PoolError::Configuration(e.to_string()))?;

        loaded.validate()?;

        debug!(
            max_tasks = loaded.max_tasks,
            max_workers_per_task = loaded.max_workers_per_task,
            reconcile_interval_ms = loaded.reconcile_interval_ms,
            "task pool configuration loaded"
        );
        Ok(loaded)
    }
}
