//! Background task dispatch
//!
//! Orchestration runs are fire-and-forget: the creating call hands a task to
//! a [`TaskDispatcher`] and returns immediately.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::runtime::Handle;

pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Accepts tasks for asynchronous execution
pub trait TaskDispatcher: Send + Sync {
    fn dispatch(&self, task: BoxedTask);
}

/// Spawns each task onto a tokio runtime
#[derive(Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Dispatcher bound to the runtime of the calling task
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl TaskDispatcher for TokioDispatcher {
    fn dispatch(&self, task: BoxedTask) {
        self.handle.spawn(task);
    }
}

/// Holds tasks until they are explicitly released
///
/// Lets callers observe state between dispatch and execution.
#[derive(Default)]
pub struct ManualDispatcher {
    queue: Mutex<Vec<BoxedTask>>,
}

impl ManualDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Runs every queued task to completion, in submission order
    pub async fn run_pending(&self) -> usize {
        let tasks: Vec<_> = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        let count = tasks.len();
        for task in tasks {
            task.await;
        }
        count
    }
}

impl TaskDispatcher for ManualDispatcher {
    fn dispatch(&self, task: BoxedTask) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);
    }
}
