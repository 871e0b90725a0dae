//! # Task Identity and the Work Seam
//!
//! A task is registered under a canonical string key produced by an
//! [`IdentityResolver`] from its [`TaskDescriptor`]. Every public operation is
//! addressable either by the descriptor or by the key it resolved to, carried
//! as a [`TaskRef`].
//!
//! The work itself enters through the [`Work`] trait: one `run` call per
//! worker, handed a fresh [`WorkerContext`] and the task's shared argument
//! binding. Closures adapt via [`work_fn`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::worker::WorkerContext;

/// Ordered argument binding, shared read-only by every worker of a task.
pub type TaskArgs = Vec<serde_json::Value>;

/// Names a registerable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskDescriptor {
    pub namespace: String,
    pub name: String,
}

impl TaskDescriptor {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Addresses a task by resolved identifier or by descriptor.
///
/// Identifiers pass through identity resolution unchanged; descriptors are
/// mapped to their canonical key first.
#[derive(Debug, Clone)]
pub enum TaskRef {
    Id(String),
    Descriptor(TaskDescriptor),
}

impl From<&str> for TaskRef {
    fn from(id: &str) -> Self {
        TaskRef::Id(id.to_string())
    }
}

impl From<String> for TaskRef {
    fn from(id: String) -> Self {
        TaskRef::Id(id)
    }
}

impl From<TaskDescriptor> for TaskRef {
    fn from(descriptor: TaskDescriptor) -> Self {
        TaskRef::Descriptor(descriptor)
    }
}

impl From<&TaskDescriptor> for TaskRef {
    fn from(descriptor: &TaskDescriptor) -> Self {
        TaskRef::Descriptor(descriptor.clone())
    }
}

/// Maps a [`TaskDescriptor`] to its canonical unique key.
///
/// Consumed as an external collaborator: the resolver must be deterministic
/// (the same descriptor always yields the same key) and collision-resistant
/// across distinct descriptors, so duplicate registrations are detectable.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, descriptor: &TaskDescriptor) -> String;
}

/// Default resolver: `namespace/name`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorKeyResolver;

impl IdentityResolver for DescriptorKeyResolver {
    fn resolve(&self, descriptor: &TaskDescriptor) -> String {
        format!("{}/{}", descriptor.namespace, descriptor.name)
    }
}

/// A unit of repeatable work.
///
/// `run` is invoked once per worker. Implementations must observe
/// [`WorkerContext::cancelled`] (or poll [`WorkerContext::is_cancelled`]) to
/// honor cooperative shutdown; the pool never forcibly terminates a worker.
#[async_trait]
pub trait Work: Send + Sync + 'static {
    async fn run(&self, ctx: WorkerContext, args: Arc<TaskArgs>);
}

/// Adapter turning an async closure into a [`Work`] implementation.
///
/// Built with [`work_fn`].
pub struct WorkFn<F> {
    f: F,
}

/// Wrap an async closure as [`Work`].
///
/// ```rust,no_run
/// use taskpool::{work_fn, TaskArgs, WorkerContext};
/// use std::sync::Arc;
///
/// let work = work_fn(|ctx: WorkerContext, _args: Arc<TaskArgs>| async move {
///     ctx.cancelled().await;
/// });
/// ```
pub fn work_fn<F, Fut>(f: F) -> WorkFn<F>
where
    F: Fn(WorkerContext, Arc<TaskArgs>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    WorkFn { f }
}

#[async_trait]
impl<F, Fut> Work for WorkFn<F>
where
    F: Fn(WorkerContext, Arc<TaskArgs>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(&self, ctx: WorkerContext, args: Arc<TaskArgs>) {
        (self.f)(ctx, args).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_resolves_to_namespaced_key() {
        let descriptor = TaskDescriptor::new("billing", "invoice_consumer");
        let resolver = DescriptorKeyResolver;
        assert_eq!(resolver.resolve(&descriptor), "billing/invoice_consumer");
        assert_eq!(descriptor.to_string(), "billing/invoice_consumer");
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = DescriptorKeyResolver;
        let a = resolver.resolve(&TaskDescriptor::new("ns", "task"));
        let b = resolver.resolve(&TaskDescriptor::new("ns", "task"));
        assert_eq!(a, b);

        let other = resolver.resolve(&TaskDescriptor::new("ns", "other"));
        assert_ne!(a, other);
    }

    #[test]
    fn task_ref_conversions() {
        assert!(matches!(TaskRef::from("some/id"), TaskRef::Id(_)));
        assert!(matches!(
            TaskRef::from(TaskDescriptor::new("ns", "task")),
            TaskRef::Descriptor(_)
        ));
    }
}
