//! End-to-end lifecycle tests for the task pool manager public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskpool::{
    work_fn, PoolError, PoolStatus, StopMode, TaskArgs, TaskDescriptor, TaskPoolConfig,
    TaskPoolManager, Work, WorkerContext,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> TaskPoolConfig {
    TaskPoolConfig {
        max_tasks: 16,
        max_workers_per_task: 128,
        reconcile_interval_ms: 25,
        stop_timeout_ms: 1_000,
    }
}

/// A worker that runs until its cancellation token fires.
fn consumer_work() -> impl Work {
    work_fn(|ctx: WorkerContext, _args: Arc<TaskArgs>| async move {
        ctx.cancelled().await;
    })
}

async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn register_and_start_five_workers() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();
    assert_eq!(id, "app/f");

    manager.start(id.as_str(), 5, Vec::new()).unwrap();

    assert_eq!(manager.status(id.as_str()).unwrap(), PoolStatus::Running);
    assert_eq!(manager.multiplicity(id.as_str()).unwrap(), 5);
    assert_eq!(manager.task_info(id.as_str()).unwrap().live_workers, 5);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_registration_leaves_original_intact() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();
    let descriptor = TaskDescriptor::new("app", "dup");

    let id = manager
        .register(descriptor.clone(), consumer_work(), Vec::new())
        .unwrap();
    manager.start(id.as_str(), 2, Vec::new()).unwrap();

    let err = manager
        .register(descriptor, consumer_work(), Vec::new())
        .unwrap_err();
    assert_eq!(err, PoolError::AlreadyRegistered { id: id.clone() });

    // The original registration kept its running pool.
    assert_eq!(manager.status(id.as_str()).unwrap(), PoolStatus::Running);
    assert_eq!(manager.multiplicity(id.as_str()).unwrap(), 2);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn shrink_drains_down_to_the_core_workers() {
    init_tracing();
    let manager = Arc::new(TaskPoolManager::new(test_config()).unwrap());

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();
    manager.start(id.as_str(), 5, Vec::new()).unwrap();

    manager.change_multiplicity(id.as_str(), 2).unwrap();
    assert_eq!(manager.multiplicity(id.as_str()).unwrap(), 2);

    let m = Arc::clone(&manager);
    let task_id = id.clone();
    wait_for("pool to drain to 2 workers", move || {
        m.task_info(task_id.as_str()).unwrap().live_workers == 2
    })
    .await;

    // Never flipped out of Running while workers remained.
    assert_eq!(manager.status(id.as_str()).unwrap(), PoolStatus::Running);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn growing_a_running_pool_reuses_bound_args() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_work = Arc::clone(&seen);
    let work = work_fn(move |ctx: WorkerContext, args: Arc<TaskArgs>| {
        let seen = Arc::clone(&seen_in_work);
        async move {
            if args.first() == Some(&serde_json::json!("queue-7")) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            ctx.cancelled().await;
        }
    });

    let id = manager
        .register(TaskDescriptor::new("app", "grow"), work, Vec::new())
        .unwrap();
    manager
        .start(id.as_str(), 2, vec![serde_json::json!("queue-7")])
        .unwrap();
    manager.change_multiplicity(id.as_str(), 6).unwrap();

    wait_for("all 6 workers to observe the binding", || {
        seen.load(Ordering::SeqCst) == 6
    })
    .await;

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn synchronous_stop_blocks_until_drained() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();
    manager.start(id.as_str(), 4, Vec::new()).unwrap();

    manager.stop(id.as_str(), StopMode::Wait).await.unwrap();

    // Fully stopped the moment the call returns.
    let info = manager.task_info(id.as_str()).unwrap();
    assert_eq!(info.status, PoolStatus::Stopped);
    assert_eq!(info.live_workers, 0);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn asynchronous_stop_is_finalized_by_the_reconciler() {
    init_tracing();
    let manager = Arc::new(TaskPoolManager::new(test_config()).unwrap());

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();
    manager.start(id.as_str(), 4, Vec::new()).unwrap();

    manager.stop(id.as_str(), StopMode::NoWait).await.unwrap();
    assert_eq!(manager.status(id.as_str()).unwrap(), PoolStatus::Stopping);

    // Within one reconciliation period of the drain, status levels to Stopped.
    let m = Arc::clone(&manager);
    let task_id = id.clone();
    wait_for("reconciler to level the stopped pool", move || {
        m.status(task_id.as_str()).unwrap() == PoolStatus::Stopped
    })
    .await;

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_after_stop_works() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();
    manager.start(id.as_str(), 3, Vec::new()).unwrap();
    manager.stop(id.as_str(), StopMode::Wait).await.unwrap();

    manager.start(id.as_str(), 1, Vec::new()).unwrap();
    assert_eq!(manager.status(id.as_str()).unwrap(), PoolStatus::Running);
    assert_eq!(manager.multiplicity(id.as_str()).unwrap(), 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn queries_on_unknown_tasks_fail_not_found() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    assert_eq!(
        manager.status("nonexistent").unwrap_err(),
        PoolError::NotFound {
            id: "nonexistent".to_string()
        }
    );
    assert!(matches!(
        manager.multiplicity("nonexistent"),
        Err(PoolError::NotFound { .. })
    ));
}

#[tokio::test]
async fn start_beyond_max_multiplicity_changes_nothing() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();

    let err = manager.start(id.as_str(), 200, Vec::new()).unwrap_err();
    assert_eq!(
        err,
        PoolError::InvalidMultiplicity {
            requested: 200,
            max: 128
        }
    );

    let info = manager.task_info(id.as_str()).unwrap();
    assert_eq!(info.status, PoolStatus::Stopped);
    assert_eq!(info.live_workers, 0);
    assert_eq!(info.desired_multiplicity, 0);
}

#[tokio::test]
async fn registry_capacity_is_enforced() {
    init_tracing();
    let config = TaskPoolConfig {
        max_tasks: 2,
        ..test_config()
    };
    let manager = TaskPoolManager::new(config).unwrap();

    manager
        .register(TaskDescriptor::new("app", "a"), consumer_work(), Vec::new())
        .unwrap();
    manager
        .register(TaskDescriptor::new("app", "b"), consumer_work(), Vec::new())
        .unwrap();

    let err = manager
        .register(TaskDescriptor::new("app", "c"), consumer_work(), Vec::new())
        .unwrap_err();
    assert_eq!(err, PoolError::CapacityExceeded { capacity: 2 });
}

#[tokio::test]
async fn unregister_refuses_live_pools_then_succeeds_after_stop() {
    init_tracing();
    let manager = TaskPoolManager::new(test_config()).unwrap();

    let id = manager
        .register(TaskDescriptor::new("app", "f"), consumer_work(), Vec::new())
        .unwrap();
    manager.start(id.as_str(), 2, Vec::new()).unwrap();

    assert!(matches!(
        manager.unregister(id.as_str()),
        Err(PoolError::Busy { .. })
    ));

    manager.stop(id.as_str(), StopMode::Wait).await.unwrap();
    manager.unregister(id.as_str()).unwrap();

    assert!(matches!(
        manager.status(id.as_str()),
        Err(PoolError::NotFound { .. })
    ));

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn naturally_finished_pool_levels_to_stopped() {
    init_tracing();
    let manager = Arc::new(TaskPoolManager::new(test_config()).unwrap());

    // Workers that complete on their own, without any cancellation.
    let work = work_fn(|_ctx: WorkerContext, _args: Arc<TaskArgs>| async move {});
    let id = manager
        .register(TaskDescriptor::new("app", "one-shot"), work, Vec::new())
        .unwrap();
    manager.start(id.as_str(), 3, Vec::new()).unwrap();

    let m = Arc::clone(&manager);
    let task_id = id.clone();
    wait_for("self-terminating pool to level to Stopped", move || {
        m.status(task_id.as_str()).unwrap() == PoolStatus::Stopped
    })
    .await;

    // Desired multiplicity is preserved; the reconciler never touches it.
    assert_eq!(manager.multiplicity(id.as_str()).unwrap(), 3);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn uncooperative_worker_surfaces_shutdown_timeout() {
    init_tracing();
    let config = TaskPoolConfig {
        stop_timeout_ms: 50,
        ..test_config()
    };
    let manager = TaskPoolManager::new(config).unwrap();

    let work = work_fn(|_ctx: WorkerContext, _args: Arc<TaskArgs>| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    let id = manager
        .register(TaskDescriptor::new("app", "stuck"), work, Vec::new())
        .unwrap();
    manager.start(id.as_str(), 1, Vec::new()).unwrap();

    let err = manager.stop(id.as_str(), StopMode::Wait).await.unwrap_err();
    assert!(matches!(err, PoolError::ShutdownTimeout { .. }));

    // The discrepancy is observable, not silent.
    assert_eq!(manager.status(id.as_str()).unwrap(), PoolStatus::Stopping);
    assert_eq!(manager.task_info(id.as_str()).unwrap().live_workers, 1);
}
