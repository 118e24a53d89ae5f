//! Hot bridge: running a producer concurrently with its consumer
//!
//! The producer runs as its own task and pushes into a [`BoundedQueue`];
//! the consumer drains the queue in FIFO order. `channel_flow`, `flow_on`
//! and `buffer` are all built on the same relay. Cancelling the consumer
//! cancels the producer, and the relay waits for the producer task to
//! finish before it returns, so no producer outlives its activation.

use crate::cancellation::CancellationToken;
use crate::error::{FlowError, FlowResult};
use crate::flow::core::{
    cancellable_delay, cooperative_checkpoint, guarded, Emitter, Flow, FlowCollector,
};
use crate::flow_configuration::ChannelConfig;
use crate::queue::{BoundedQueue, QueueReceiver, QueueSender, TrySendError};
use crate::scheduler::{current_handle, SchedulerContext};
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Producer side of a bridged flow
pub struct ProducerScope<T> {
    sender: QueueSender<T>,
    token: CancellationToken,
    context: SchedulerContext,
}

impl<T: Send + 'static> ProducerScope<T> {
    /// Send a value to the consumer, suspending while the queue is full.
    ///
    /// Fails with [`FlowError::Cancelled`] once the consumer is cancelled
    /// (a suspended send is woken), and with [`FlowError::Closed`] if the
    /// consumer has gone away.
    pub async fn send(&self, value: T) -> FlowResult<()> {
        if self.token.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FlowError::Cancelled),
            sent = self.sender.send(value) => sent,
        }
    }

    /// Send without suspending; the value is handed back when it cannot be queued.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        if self.token.is_cancelled() {
            return Err(TrySendError::Closed(value));
        }
        self.sender.try_send(value)
    }

    pub async fn delay(&self, duration: Duration) -> FlowResult<()> {
        cancellable_delay(&self.token, duration).await
    }

    pub async fn checkpoint(&self) -> FlowResult<()> {
        cooperative_checkpoint(&self.token).await
    }

    /// True once nothing sent from here can reach the consumer any more.
    pub fn is_closed_for_send(&self) -> bool {
        self.token.is_cancelled() || self.sender.is_closed()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Context the producer task runs on.
    pub fn context(&self) -> &SchedulerContext {
        &self.context
    }
}

/// Upstream collector of `flow_on`/`buffer`: forwards into the queue
struct SendStage<T> {
    scope: ProducerScope<T>,
}

#[async_trait]
impl<T: Send + 'static> FlowCollector<T> for SendStage<T> {
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        self.scope.send(value).await
    }
}

/// Spawn `body` on `context`, feeding a fresh queue. The queue ends once
/// `body` has returned and dropped its scope.
fn spawn_producer<T, B, Fut>(
    context: &SchedulerContext,
    config: ChannelConfig,
    token: CancellationToken,
    body: B,
) -> FlowResult<(QueueReceiver<T>, JoinHandle<FlowResult<()>>)>
where
    T: Send + 'static,
    B: FnOnce(ProducerScope<T>) -> Fut + Send + 'static,
    Fut: Future<Output = FlowResult<()>> + Send + 'static,
{
    let queue = BoundedQueue::new(config.capacity);
    let scope = ProducerScope {
        sender: queue.take_sender()?,
        token,
        context: context.clone(),
    };
    let receiver = queue.take_receiver()?;
    let context_name = context.name().to_string();
    let producer = context.spawn(async move {
        let result = guarded(async move { body(scope).await }).await;
        log::trace!("bridged producer on `{}` finished: {:?}", context_name, result);
        result
    })?;
    Ok((receiver, producer))
}

/// Run `body` as a producer task on `context` and relay what it sends into `downstream`.
async fn relay<T, B, Fut>(
    context: SchedulerContext,
    config: ChannelConfig,
    downstream: &mut Emitter<T>,
    body: B,
) -> FlowResult<()>
where
    T: Send + 'static,
    B: FnOnce(ProducerScope<T>) -> Fut + Send + 'static,
    Fut: Future<Output = FlowResult<()>> + Send + 'static,
{
    let token = downstream.token().clone();
    let producer_token = token.child_token();
    let (mut receiver, producer) = spawn_producer(&context, config, producer_token.clone(), body)?;

    let drained = loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break Err(FlowError::Cancelled),
            next = receiver.recv() => next,
        };
        match next {
            Some(value) => {
                if let Err(err) = downstream.emit(value).await {
                    break Err(err);
                }
            }
            None => break Ok(()),
        }
    };

    if drained.is_err() {
        producer_token.cancel();
    }
    receiver.close();
    let produced = match producer.await {
        Ok(result) => result,
        Err(join_error) => Err(FlowError::from(join_error)),
    };

    match drained {
        Ok(()) => produced,
        Err(err) => {
            log::trace!(
                "consumer stopped early ({}), producer returned {:?}",
                err,
                produced
            );
            Err(err)
        }
    }
}

/// Create a flow whose producer runs concurrently with its consumer and
/// sends values through a queue with the default [`ChannelConfig`].
///
/// The producer task is spawned on the collecting activation's context.
///
/// # Examples
/// ```
/// use rs2_flow::channel_flow;
/// use std::time::Duration;
///
/// # async fn example() {
/// let ticks = channel_flow(|scope| async move {
///     for i in 1..=5 {
///         scope.delay(Duration::from_millis(1)).await?;
///         scope.send(i).await?;
///     }
///     Ok(())
/// });
/// assert_eq!(ticks.to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);
/// # }
/// ```
pub fn channel_flow<T, F, Fut>(producer: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(ProducerScope<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<()>> + Send + 'static,
{
    channel_flow_with(ChannelConfig::default(), producer)
}

/// [`channel_flow`] with an explicit queue configuration.
pub fn channel_flow_with<T, F, Fut>(config: ChannelConfig, producer: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(ProducerScope<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<()>> + Send + 'static,
{
    let producer = Arc::new(producer);
    Flow::define(move |mut downstream: Emitter<T>| {
        let producer = Arc::clone(&producer);
        async move {
            let context = downstream.context().clone();
            relay(context, config, &mut downstream, move |scope| producer(scope)).await
        }
    })
}

impl<T: Send + 'static> Flow<T> {
    /// Run the upstream producer on `context`; downstream stages and the
    /// consumer stay on the context the flow is collected under.
    ///
    /// Values and their order are unchanged.
    pub fn flow_on(self, context: SchedulerContext) -> Flow<T> {
        self.flow_on_with(context, ChannelConfig::default())
    }

    /// [`flow_on`](Flow::flow_on) with an explicit queue configuration.
    pub fn flow_on_with(self, context: SchedulerContext, config: ChannelConfig) -> Flow<T> {
        self.bridged(Some(context), config)
    }

    /// Decouple the upstream producer from a slower consumer with a queue,
    /// keeping both on the collecting context.
    pub fn buffer(self, config: ChannelConfig) -> Flow<T> {
        self.bridged(None, config)
    }

    fn bridged(self, context: Option<SchedulerContext>, config: ChannelConfig) -> Flow<T> {
        let upstream = self;
        Flow::define(move |mut downstream: Emitter<T>| {
            let upstream = upstream.clone();
            let context = context
                .clone()
                .unwrap_or_else(|| downstream.context().clone());
            async move {
                relay(context, config, &mut downstream, move |scope| {
                    let token = scope.token().clone();
                    let context = scope.context().clone();
                    upstream.drive(Emitter::new(SendStage { scope }, token, context))
                })
                .await
            }
        })
    }

    /// Activate the flow on the current runtime and expose it as a
    /// `futures` stream of results.
    ///
    /// Dropping the stream cancels the activation. A failure is yielded as
    /// the final `Err` item; cancellation simply ends the stream.
    pub fn into_stream(self) -> FlowResult<BoxStream<'static, FlowResult<T>>> {
        let handle = current_handle("Flow::into_stream")?;
        let context = SchedulerContext::from_handle("stream", handle);
        let token = CancellationToken::new();
        let flow = self;
        let (mut receiver, producer) = spawn_producer(
            &context,
            ChannelConfig::default(),
            token.clone(),
            move |scope| {
                let token = scope.token().clone();
                let context = scope.context().clone();
                flow.drive(Emitter::new(SendStage { scope }, token, context))
            },
        )?;
        let guard = token.drop_guard();

        Ok(stream! {
            let _guard = guard;
            while let Some(value) = receiver.recv().await {
                yield Ok(value);
            }
            match producer.await {
                Ok(Ok(())) | Ok(Err(FlowError::Cancelled)) => {}
                Ok(Err(err)) => yield Err(err),
                Err(join_error) => yield Err(FlowError::from(join_error)),
            }
        }
        .boxed())
    }
}
