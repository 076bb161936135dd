//! Synchronous or deferred execution of blocking planning and execution
//! stages, with cancellation shared across a chain.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run on the calling thread and block until done.
    #[default]
    Synchronous,
    /// Run on the blocking pool and return a handle immediately.
    Deferred,
}

/// Schedules stages on a tokio runtime.
#[derive(Debug, Clone)]
pub struct DeferredExecutor {
    runtime: Handle,
}

impl DeferredExecutor {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Executor bound to the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ExecutionError::TaskFailed(e.to_string()))
    }

    pub fn run<T, E, F>(&self, mode: ExecutionMode, stage: F) -> Execution<T>
    where
        T: Send + 'static,
        E: Into<ExecutionError>,
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    {
        match mode {
            ExecutionMode::Synchronous => Execution::Complete(run_inline(stage).map_err(Into::into)),
            ExecutionMode::Deferred => {
                Execution::Deferred(DeferredTask::spawn(&self.runtime, CancellationToken::new(), stage))
            }
        }
    }
}

/// Runs a blocking stage on the calling thread. A multi-threaded runtime
/// worker first hands its queued tasks to another thread.
fn run_inline<R>(stage: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(stage),
        _ => stage(),
    }
}

/// Outcome of [`DeferredExecutor::run`].
#[derive(Debug)]
pub enum Execution<T> {
    Complete(Result<T>),
    Deferred(DeferredTask<T>),
}

impl<T: Send + 'static> Execution<T> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Runs `stage` on the result, inline for a completed execution and as
    /// a chained stage for a deferred one.
    pub fn then<U, E, F>(self, stage: F) -> Execution<U>
    where
        U: Send + 'static,
        E: Into<ExecutionError>,
        F: FnOnce(T) -> std::result::Result<U, E> + Send + 'static,
    {
        match self {
            Self::Complete(result) => {
                Execution::Complete(result.and_then(|value| run_inline(|| stage(value)).map_err(Into::into)))
            }
            Self::Deferred(task) => Execution::Deferred(task.then(stage)),
        }
    }

    pub async fn resolve(self) -> Result<T> {
        match self {
            Self::Complete(result) => result,
            Self::Deferred(task) => task.await,
        }
    }
}

/// Handle to a stage running on the blocking pool. Awaiting it yields the
/// stage result or the error that stopped the chain.
///
/// Cancellation is cooperative: a running stage always finishes, but no
/// stage of the chain starts once the token is cancelled.
#[derive(Debug)]
pub struct DeferredTask<T> {
    handle: JoinHandle<Result<T>>,
    token: CancellationToken,
    runtime: Handle,
}

impl<T: Send + 'static> DeferredTask<T> {
    fn spawn<E, F>(runtime: &Handle, token: CancellationToken, stage: F) -> Self
    where
        E: Into<ExecutionError>,
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    {
        let guard = token.clone();
        let handle = runtime.spawn_blocking(move || {
            if guard.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            stage().map_err(Into::into)
        });

        Self {
            handle,
            token,
            runtime: runtime.clone(),
        }
    }

    pub fn cancel(&self) {
        debug!("cancelling deferred chain");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Chains `stage` after this task. It starts only once this task has
    /// resolved successfully, and only if the chain was not cancelled.
    pub fn then<U, E, F>(self, stage: F) -> DeferredTask<U>
    where
        U: Send + 'static,
        E: Into<ExecutionError>,
        F: FnOnce(T) -> std::result::Result<U, E> + Send + 'static,
    {
        let Self {
            handle: previous,
            token,
            runtime,
        } = self;
        let guard = token.clone();
        let blocking = runtime.clone();

        let handle: JoinHandle<Result<U>> = runtime.spawn(async move {
            let value = previous.await??;
            if guard.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            blocking
                .spawn_blocking(move || stage(value).map_err(Into::into))
                .await?
        });

        DeferredTask {
            handle,
            token,
            runtime,
        }
    }
}

impl<T> Future for DeferredTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.map_err(ExecutionError::from).and_then(|result| result))
    }
}
