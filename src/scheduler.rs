//! Scheduler contexts: where flow work runs
//!
//! A [`SchedulerContext`] is a named, read-only handle onto an executor.
//! Many activations may share one without coordination. There is no hidden
//! default: every activation is given its context explicitly.

use crate::error::{FlowError, FlowResult};
use crate::flow_configuration::SchedulerConfig;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

#[derive(Clone)]
enum Target {
    /// A specific runtime, e.g. an IO pool or a single-threaded main loop
    Runtime(Handle),
    /// Whatever runtime the caller is running on, resolved at spawn time
    Current,
}

/// Handle to an executor that flow work can be scheduled onto
#[derive(Clone)]
pub struct SchedulerContext {
    name: Arc<str>,
    target: Target,
}

impl SchedulerContext {
    /// Context backed by an existing runtime handle.
    pub fn from_handle(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: Arc::from(name.into()),
            target: Target::Runtime(handle),
        }
    }

    /// Context backed by a runtime built from `config`; the context is named after it.
    pub fn from_runtime(config: &SchedulerConfig, runtime: &Runtime) -> Self {
        Self::from_handle(config.name.clone(), runtime.handle().clone())
    }

    /// Context that follows the caller's runtime.
    ///
    /// On a current-thread runtime this is the purely cooperative model:
    /// every unit of work interleaves on one thread at suspension points.
    pub fn current() -> Self {
        Self {
            name: Arc::from("current"),
            target: Target::Current,
        }
    }

    /// Capture the caller's runtime now. Fails outside of a runtime.
    pub fn bind_current(name: impl Into<String>) -> FlowResult<Self> {
        let handle = current_handle("SchedulerContext::bind_current")?;
        Ok(Self::from_handle(name, handle))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the runtime handle this context schedules onto.
    pub fn handle(&self) -> FlowResult<Handle> {
        match &self.target {
            Target::Runtime(handle) => Ok(handle.clone()),
            Target::Current => current_handle("SchedulerContext::handle"),
        }
    }

    /// Spawn a unit of work on this context.
    pub fn spawn<F>(&self, future: F) -> FlowResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.handle()?;
        log::trace!("spawning task on context `{}`", self.name);
        Ok(handle.spawn(future))
    }

    /// Run a blocking closure on this context's blocking pool and await its result.
    pub async fn run_blocking<F, R>(&self, f: F) -> FlowResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.handle()?;
        Ok(handle.spawn_blocking(f).await?)
    }
}

impl fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            Target::Runtime(_) => "runtime",
            Target::Current => "current",
        };
        f.debug_struct("SchedulerContext")
            .field("name", &self.name)
            .field("target", &target)
            .finish()
    }
}

/// Fail with a usage error when `operation` is invoked outside of a runtime.
pub(crate) fn current_handle(operation: &str) -> FlowResult<Handle> {
    Handle::try_current().map_err(|_| {
        FlowError::usage(format!(
            "{} must be called from within a tokio runtime",
            operation
        ))
    })
}
