//! Core flow definition and emission channel
//!
//! A [`Flow`] is an inert recipe: a producer behavior that, given a fresh
//! [`Emitter`], pushes values into it. Nothing runs until the flow is
//! activated, and every activation builds its own emitter chain.

use crate::cancellation::CancellationToken;
use crate::error::{FlowError, FlowResult};
use crate::scheduler::SchedulerContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Receiving side of one stage of an activation.
///
/// Operator stages and final consumers implement this; producers never see
/// it directly, they push through an [`Emitter`].
#[async_trait]
pub trait FlowCollector<T>: Send {
    /// Accept one value. An error stops the producer feeding this collector.
    async fn emit(&mut self, value: T) -> FlowResult<()>;
}

/// Per-activation emission channel handed to a producer
pub struct Emitter<T> {
    sink: Box<dyn FlowCollector<T>>,
    token: CancellationToken,
    context: SchedulerContext,
}

impl<T: Send + 'static> Emitter<T> {
    pub fn new<C>(sink: C, token: CancellationToken, context: SchedulerContext) -> Self
    where
        C: FlowCollector<T> + 'static,
    {
        Self {
            sink: Box::new(sink),
            token,
            context,
        }
    }

    /// Push one value downstream.
    ///
    /// This is a checkpoint: it fails with [`FlowError::Cancelled`] instead of
    /// delivering once the activation is cancelled, and it reports a
    /// cancellation raised while the value was being delivered.
    pub async fn emit(&mut self, value: T) -> FlowResult<()> {
        self.ensure_active()?;
        self.sink.emit(value).await?;
        self.ensure_active()
    }

    /// Suspend for `duration`, waking early with an error if cancelled.
    pub async fn delay(&mut self, duration: Duration) -> FlowResult<()> {
        cancellable_delay(&self.token, duration).await
    }

    /// Observe cancellation and yield to the scheduler.
    pub async fn checkpoint(&mut self) -> FlowResult<()> {
        cooperative_checkpoint(&self.token).await
    }

    pub fn ensure_active(&self) -> FlowResult<()> {
        if self.token.is_cancelled() {
            Err(FlowError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Context this stage of the activation is running under.
    pub fn context(&self) -> &SchedulerContext {
        &self.context
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("token", &self.token)
            .field("context", &self.context)
            .finish()
    }
}

type Producer<T> = dyn Fn(Emitter<T>) -> BoxFuture<'static, FlowResult<()>> + Send + Sync;

/// A cold, lazily evaluated sequence of `T`.
///
/// Cloning is cheap and yields the same definition. Each activation runs
/// the producer from scratch, independent of any other activation.
pub struct Flow<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Flow {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T: Send + 'static> Flow<T> {
    /// Wrap a producer behavior into a flow. No work happens here.
    ///
    /// # Examples
    /// ```
    /// use rs2_flow::Flow;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let numbers = Flow::define(|mut out| async move {
    ///     for i in 1..=3 {
    ///         out.delay(Duration::from_millis(1)).await?;
    ///         out.emit(i).await?;
    ///     }
    ///     Ok(())
    /// });
    ///
    /// assert_eq!(numbers.to_vec().await.unwrap(), vec![1, 2, 3]);
    /// # }
    /// ```
    pub fn define<F, Fut>(producer: F) -> Self
    where
        F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<()>> + Send + 'static,
    {
        Flow {
            producer: Arc::new(move |emitter| producer(emitter).boxed()),
        }
    }

    /// Run the producer against `emitter`.
    pub(crate) fn drive(&self, emitter: Emitter<T>) -> BoxFuture<'static, FlowResult<()>> {
        (self.producer)(emitter)
    }
}

impl<T> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

pub(crate) async fn cancellable_delay(
    token: &CancellationToken,
    duration: Duration,
) -> FlowResult<()> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FlowError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

pub(crate) async fn cooperative_checkpoint(token: &CancellationToken) -> FlowResult<()> {
    if token.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    tokio::task::yield_now().await;
    if token.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    Ok(())
}

/// Poll `work` and turn a panic into a producer failure.
pub(crate) async fn guarded<F>(work: F) -> FlowResult<()>
where
    F: Future<Output = FlowResult<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            log::warn!("flow producer panicked: {}", message);
            Err(FlowError::producer(format!("panicked: {}", message)))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
