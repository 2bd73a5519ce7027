//! Execution contexts — where an agent's behaviours are scheduled.
//!
//! All behaviours of one agent run as tasks on one [`ExecutionContext`].
//! [`AgentThread`] provides the usual setup: a dedicated OS thread driving a
//! current-thread tokio runtime, so an agent's behaviours interleave only at
//! their `.await` points and never run in parallel with each other.

use spindle_core::Message;
use spindle_core::error::BehaviourError;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::{MessageQueue, QueueSender};

/// A cloneable handle to the scheduler an agent's behaviours run on.
#[derive(Clone)]
pub struct ExecutionContext {
    name: Arc<str>,
    handle: Handle,
}

impl ExecutionContext {
    /// The runtime the caller is currently running on.
    pub fn current() -> Result<Self, BehaviourError> {
        let handle = Handle::try_current().map_err(|e| BehaviourError::NoRuntime(e.to_string()))?;
        Ok(Self::from_handle("current", handle))
    }

    /// Wrap an existing runtime handle.
    pub fn from_handle(name: impl Into<String>, handle: Handle) -> Self {
        let name: String = name.into();
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule a unit of cooperative work.
    pub fn submit<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(task)
    }

    /// Create an inbox whose timed receives are driven by this context.
    pub fn queue(&self) -> (QueueSender, MessageQueue) {
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        debug!(context = %self.name, "Allocated message queue");
        (QueueSender::new(tx), MessageQueue::new(rx))
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .finish()
    }
}

/// A dedicated thread running one single-threaded event loop.
///
/// Dropping or calling [`AgentThread::shutdown`] stops the loop; tasks still
/// running on it are cancelled. Both block the calling thread until the loop
/// thread has exited, so never call them from a task running on this thread.
pub struct AgentThread {
    context: ExecutionContext,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AgentThread {
    /// Start the thread and its event loop.
    pub fn spawn(name: impl Into<String>) -> Result<Self, BehaviourError> {
        let name: String = name.into();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BehaviourError::NoRuntime(e.to_string()))?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                runtime.block_on(async {
                    // Sender dropped counts as a stop request too
                    let _ = stop_rx.await;
                });
                debug!(thread = %thread_name, "Event loop stopped");
            })
            .map_err(|e| BehaviourError::NoRuntime(e.to_string()))?;

        info!(thread = %name, "Started agent thread");
        Ok(Self {
            context: ExecutionContext::from_handle(name, handle),
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Stop the event loop and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(thread = %self.context.name(), "Agent thread panicked during shutdown");
        }
    }
}

impl Drop for AgentThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
