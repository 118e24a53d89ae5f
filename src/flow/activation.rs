//! Activating flows: collecting values and delivering the terminal signal
//!
//! An activation is one live run of a flow, bound to a [`SchedulerContext`]
//! and a [`CancellationToken`]. It delivers values in emission order and
//! then exactly one terminal signal: completion, failure or cancellation.

use crate::cancellation::CancellationToken;
use crate::error::{FlowError, FlowResult};
use crate::flow::core::{guarded, panic_message, Emitter, Flow, FlowCollector};
use crate::scheduler::{current_handle, SchedulerContext};
use async_trait::async_trait;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::{JoinError, JoinHandle};

static NEXT_ACTIVATION_ID: AtomicU64 = AtomicU64::new(1);

/// The single terminal outcome of an activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The producer finished and every value was delivered
    Completed,
    /// The producer or an operator failed
    Failed(FlowError),
    /// The activation was cancelled before it finished
    Cancelled,
}

impl Termination {
    /// Outcome of a joined activation task.
    fn joined(result: Result<Termination, JoinError>) -> Self {
        match result {
            Ok(termination) => termination,
            Err(join_error) if join_error.is_cancelled() => Termination::Cancelled,
            Err(join_error) => Termination::Failed(FlowError::from(join_error)),
        }
    }

    fn resolve(outcome: FlowResult<()>, token: &CancellationToken) -> Self {
        if token.is_cancelled() {
            return Termination::Cancelled;
        }
        match outcome {
            Ok(()) => Termination::Completed,
            Err(FlowError::Cancelled) => Termination::Cancelled,
            Err(err) => Termination::Failed(err),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Termination::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Termination::Cancelled)
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            Termination::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// `Ok` only for completion; cancellation maps to [`FlowError::Cancelled`].
    pub fn into_result(self) -> FlowResult<()> {
        match self {
            Termination::Completed => Ok(()),
            Termination::Failed(err) => Err(err),
            Termination::Cancelled => Err(FlowError::Cancelled),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Failed(err) => write!(f, "failed: {}", err),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

type OnValue<T> = Box<dyn FnMut(T) + Send>;
type OnTerminal<A> = Box<dyn FnOnce(A) + Send>;

/// Consumer callbacks for one activation
pub struct Subscriber<T> {
    on_value: OnValue<T>,
    on_complete: Option<OnTerminal<()>>,
    on_error: Option<OnTerminal<FlowError>>,
    on_cancel: Option<OnTerminal<()>>,
}

impl<T: Send + 'static> Subscriber<T> {
    pub fn new<F>(on_value: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        Self {
            on_value: Box::new(on_value),
            on_complete: None,
            on_error: None,
            on_cancel: None,
        }
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(move |()| f()));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(FlowError) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_cancel<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(move |()| f()));
        self
    }

    fn split(self) -> (ValueSink<T>, TerminalCallbacks) {
        (
            ValueSink {
                on_value: self.on_value,
            },
            TerminalCallbacks {
                on_complete: self.on_complete,
                on_error: self.on_error,
                on_cancel: self.on_cancel,
            },
        )
    }
}

struct TerminalCallbacks {
    on_complete: Option<OnTerminal<()>>,
    on_error: Option<OnTerminal<FlowError>>,
    on_cancel: Option<OnTerminal<()>>,
}

impl TerminalCallbacks {
    /// Run the one callback matching `termination`. A panicking callback is
    /// logged and does not change the termination.
    fn deliver(self, termination: &Termination) {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| self.invoke(termination))) {
            log::warn!(
                "terminal callback for `{}` panicked: {}",
                termination,
                panic_message(panic.as_ref())
            );
        }
    }

    fn invoke(self, termination: &Termination) {
        match termination {
            Termination::Completed => {
                if let Some(f) = self.on_complete {
                    f(());
                }
            }
            Termination::Failed(err) => match self.on_error {
                Some(f) => f(err.clone()),
                None => log::debug!("flow failed without an error callback: {}", err),
            },
            Termination::Cancelled => {
                if let Some(f) = self.on_cancel {
                    f(());
                }
            }
        }
    }
}

/// Final collector of an activation
struct ValueSink<T> {
    on_value: OnValue<T>,
}

#[async_trait]
impl<T: Send + 'static> FlowCollector<T> for ValueSink<T> {
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        (self.on_value)(value);
        Ok(())
    }
}

/// Handle to an activation launched with [`Flow::launch`]
///
/// Dropping the handle does not cancel the activation.
#[derive(Debug)]
pub struct Activation {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<Termination>,
}

impl Activation {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation; the producer stops at its next checkpoint and
    /// the subscriber receives the cancellation signal.
    pub fn cancel(&self) {
        log::debug!("activation {} cancellation requested", self.id);
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the activation to terminate.
    pub async fn join(self) -> Termination {
        Termination::joined(self.handle.await)
    }
}

async fn run_activation<T: Send + 'static>(
    id: u64,
    flow: Flow<T>,
    context: SchedulerContext,
    token: CancellationToken,
    subscriber: Subscriber<T>,
) -> Termination {
    let (sink, callbacks) = subscriber.split();
    log::debug!("activation {} started on `{}`", id, context.name());

    let emitter = Emitter::new(sink, token.clone(), context);
    let outcome = guarded(async move { flow.drive(emitter).await }).await;
    let termination = Termination::resolve(outcome, &token);

    log::debug!("activation {} {}", id, termination);
    callbacks.deliver(&termination);
    termination
}

fn next_activation_id() -> u64 {
    NEXT_ACTIVATION_ID.fetch_add(1, Ordering::Relaxed)
}

impl<T: Send + 'static> Flow<T> {
    /// Collect every value with `on_value` on the caller's runtime.
    ///
    /// Returns `Ok` on completion, the failure otherwise. Must be awaited
    /// inside a tokio runtime; elsewhere it fails with [`FlowError::Usage`]
    /// without activating the flow.
    pub async fn collect<F>(&self, on_value: F) -> FlowResult<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        let termination = self
            .collect_in(
                &SchedulerContext::current(),
                CancellationToken::new(),
                Subscriber::new(on_value),
            )
            .await?;
        termination.into_result()
    }

    /// Run an activation on `context`, bound to `token`, and wait for it.
    ///
    /// The producer and the subscriber callbacks run on `context`. The
    /// outer `Err` is a usage error raised before activation; the terminal
    /// signal of the activation is the returned [`Termination`]. Dropping
    /// the returned future cancels the activation.
    pub async fn collect_in(
        &self,
        context: &SchedulerContext,
        token: CancellationToken,
        subscriber: Subscriber<T>,
    ) -> FlowResult<Termination> {
        current_handle("Flow::collect")?;
        let task = run_activation(
            next_activation_id(),
            self.clone(),
            context.clone(),
            token.clone(),
            subscriber,
        );
        let handle = context.spawn(task)?;
        let abandon = token.drop_guard();
        let termination = Termination::joined(handle.await);
        abandon.disarm();
        Ok(termination)
    }

    /// Start an activation as a task on `context` with a fresh token.
    ///
    /// Values and the terminal signal are delivered on `context`.
    pub fn launch(
        &self,
        context: &SchedulerContext,
        subscriber: Subscriber<T>,
    ) -> FlowResult<Activation> {
        self.launch_with_token(context, CancellationToken::new(), subscriber)
    }

    /// [`launch`](Flow::launch) bound to a caller-owned token.
    pub fn launch_with_token(
        &self,
        context: &SchedulerContext,
        token: CancellationToken,
        subscriber: Subscriber<T>,
    ) -> FlowResult<Activation> {
        let id = next_activation_id();
        let task = run_activation(id, self.clone(), context.clone(), token.clone(), subscriber);
        let handle = context.spawn(task)?;
        Ok(Activation { id, token, handle })
    }

    /// Collect all values into a `Vec`.
    pub async fn to_vec(&self) -> FlowResult<Vec<T>> {
        self.fold(Vec::new(), |mut items, value| {
            items.push(value);
            items
        })
        .await
    }

    /// Fold all values into an accumulator.
    pub async fn fold<A, F>(&self, init: A, mut f: F) -> FlowResult<A>
    where
        A: Send + 'static,
        F: FnMut(A, T) -> A + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(init)));
        let sink_slot = Arc::clone(&slot);
        self.collect(move |value| {
            let mut guard = sink_slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(acc) = guard.take() {
                *guard = Some(f(acc, value));
            }
        })
        .await?;

        let acc = slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        acc.ok_or_else(|| FlowError::producer("fold accumulator was lost"))
    }
}
