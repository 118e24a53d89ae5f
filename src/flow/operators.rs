//! Operator algebra over flows
//!
//! Every operator returns a new cold [`Flow`] whose producer drives the
//! upstream flow through a stage collector. Stages run in the order they
//! were written; nothing is reordered or fused.
//!
//! Operators that can end early (`take`, `take_while`, and the fallible
//! `try_*` operators) give their upstream a child cancellation token and
//! cancel it when they stop, so the upstream producer stops at its next
//! checkpoint instead of running to completion.

use crate::cancellation::CancellationToken;
use crate::error::{FlowError, FlowResult};
use crate::flow::constructors::empty;
use crate::flow::core::{Emitter, Flow, FlowCollector};
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Why a short-circuiting stage stopped its upstream
#[derive(Debug)]
enum Stop {
    /// The stage has all it wants; the flow completes normally
    Satisfied,
    /// The stage failed; the flow terminates with this error
    Failed(FlowError),
}

/// Upstream cancellation handle owned by one stage of one activation
#[derive(Clone)]
struct ShortCircuit {
    upstream: CancellationToken,
    stop: Arc<OnceLock<Stop>>,
}

impl ShortCircuit {
    fn new(downstream: &CancellationToken) -> Self {
        Self {
            upstream: downstream.child_token(),
            stop: Arc::new(OnceLock::new()),
        }
    }

    fn upstream_token(&self) -> CancellationToken {
        self.upstream.clone()
    }

    fn satisfied(&self) {
        let _ = self.stop.set(Stop::Satisfied);
        self.upstream.cancel();
    }

    fn fail(&self, error: FlowError) -> FlowError {
        let _ = self.stop.set(Stop::Failed(error.clone()));
        self.upstream.cancel();
        error
    }

    /// Decide the stage's outcome once the upstream producer has returned.
    fn resolve(&self, upstream: FlowResult<()>) -> FlowResult<()> {
        match self.stop.get() {
            Some(Stop::Satisfied) => {
                log::trace!("stage satisfied, upstream returned {:?}", upstream);
                Ok(())
            }
            Some(Stop::Failed(error)) => Err(error.clone()),
            None => upstream,
        }
    }
}

/// Build a flow that feeds `upstream` through a stage made fresh per activation.
fn staged<T, U, S, M>(upstream: Flow<T>, make_stage: M) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: FlowCollector<T> + 'static,
    M: Fn(Emitter<U>) -> S + Send + Sync + 'static,
{
    Flow::define(move |downstream: Emitter<U>| {
        let token = downstream.token().clone();
        let context = downstream.context().clone();
        upstream.drive(Emitter::new(make_stage(downstream), token, context))
    })
}

/// Like [`staged`], for stages that may cancel their upstream.
fn short_circuited<T, U, S, M>(upstream: Flow<T>, make_stage: M) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: FlowCollector<T> + 'static,
    M: Fn(Emitter<U>, ShortCircuit) -> S + Send + Sync + 'static,
{
    Flow::define(move |downstream: Emitter<U>| {
        let circuit = ShortCircuit::new(downstream.token());
        let context = downstream.context().clone();
        let token = circuit.upstream_token();
        let run = upstream.drive(Emitter::new(
            make_stage(downstream, circuit.clone()),
            token,
            context,
        ));
        async move { circuit.resolve(run.await) }
    })
}

struct MapStage<U, F> {
    downstream: Emitter<U>,
    f: Arc<F>,
}

#[async_trait]
impl<T, U, F> FlowCollector<T> for MapStage<U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        let mapped = (self.f)(value);
        self.downstream.emit(mapped).await
    }
}

struct TryMapStage<U, F> {
    downstream: Emitter<U>,
    f: Arc<F>,
    circuit: ShortCircuit,
}

#[async_trait]
impl<T, U, E, F> FlowCollector<T> for TryMapStage<U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Display,
    F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        let mapped = match (self.f)(value) {
            Ok(mapped) => mapped,
            Err(err) => return Err(self.circuit.fail(FlowError::operator("try_map", err))),
        };
        self.downstream.emit(mapped).await
    }
}

struct EvalMapStage<U, F> {
    downstream: Emitter<U>,
    f: Arc<F>,
}

#[async_trait]
impl<T, U, F, Fut> FlowCollector<T> for EvalMapStage<U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        let token = self.downstream.token().clone();
        let pending = (self.f)(value);
        let mapped = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FlowError::Cancelled),
            mapped = pending => mapped,
        };
        self.downstream.emit(mapped).await
    }
}

struct FilterStage<T, F> {
    downstream: Emitter<T>,
    predicate: Arc<F>,
}

#[async_trait]
impl<T, F> FlowCollector<T> for FilterStage<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        if (self.predicate)(&value) {
            self.downstream.emit(value).await
        } else {
            Ok(())
        }
    }
}

struct EvalFilterStage<T, F> {
    downstream: Emitter<T>,
    predicate: Arc<F>,
}

#[async_trait]
impl<T, F, Fut> FlowCollector<T> for EvalFilterStage<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        let token = self.downstream.token().clone();
        let verdict = (self.predicate)(&value);
        let keep = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FlowError::Cancelled),
            keep = verdict => keep,
        };
        if keep {
            self.downstream.emit(value).await
        } else {
            Ok(())
        }
    }
}

struct OnEachStage<T, F> {
    downstream: Emitter<T>,
    action: Arc<F>,
}

#[async_trait]
impl<T, F> FlowCollector<T> for OnEachStage<T, F>
where
    T: Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        (self.action)(&value);
        self.downstream.emit(value).await
    }
}

struct TryOnEachStage<T, F> {
    downstream: Emitter<T>,
    action: Arc<F>,
    circuit: ShortCircuit,
}

#[async_trait]
impl<T, E, F> FlowCollector<T> for TryOnEachStage<T, F>
where
    T: Send + 'static,
    E: Display,
    F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        if let Err(err) = (self.action)(&value) {
            return Err(self.circuit.fail(FlowError::operator("on_each", err)));
        }
        self.downstream.emit(value).await
    }
}

struct DelayStage<T> {
    downstream: Emitter<T>,
    duration: Duration,
}

#[async_trait]
impl<T: Send + 'static> FlowCollector<T> for DelayStage<T> {
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        self.downstream.delay(self.duration).await?;
        self.downstream.emit(value).await
    }
}

struct TakeStage<T> {
    downstream: Emitter<T>,
    remaining: usize,
    circuit: ShortCircuit,
}

#[async_trait]
impl<T: Send + 'static> FlowCollector<T> for TakeStage<T> {
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        if self.remaining == 0 {
            self.circuit.satisfied();
            return Err(FlowError::Cancelled);
        }
        self.remaining -= 1;
        let delivered = self.downstream.emit(value).await;
        if self.remaining == 0 && delivered.is_ok() {
            self.circuit.satisfied();
        }
        delivered
    }
}

struct TakeWhileStage<T, S, F> {
    downstream: Emitter<T>,
    state: S,
    predicate: Arc<F>,
    circuit: ShortCircuit,
}

#[async_trait]
impl<T, S, F> FlowCollector<T> for TakeWhileStage<T, S, F>
where
    T: Send + 'static,
    S: Send + 'static,
    F: Fn(&mut S, &T) -> bool + Send + Sync + 'static,
{
    async fn emit(&mut self, value: T) -> FlowResult<()> {
        if (self.predicate)(&mut self.state, &value) {
            self.downstream.emit(value).await
        } else {
            self.circuit.satisfied();
            Err(FlowError::Cancelled)
        }
    }
}

impl<T: Send + 'static> Flow<T> {
    /// Transform each value.
    pub fn map<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        staged(self, move |downstream| MapStage {
            downstream,
            f: Arc::clone(&f),
        })
    }

    /// Transform each value with a fallible function.
    ///
    /// The first error terminates the flow with [`FlowError::Operator`] and
    /// cancels the upstream producer.
    pub fn try_map<U, E, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        E: Display,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        short_circuited(self, move |downstream, circuit| TryMapStage {
            downstream,
            f: Arc::clone(&f),
            circuit,
        })
    }

    /// Transform each value with an async function, one value at a time.
    ///
    /// # Examples
    /// ```
    /// use rs2_flow::from_iter;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let responses = from_iter(1..=3).eval_map(|n| async move {
    ///     tokio::time::sleep(Duration::from_millis(5)).await;
    ///     format!("response {}", n)
    /// });
    /// assert_eq!(responses.to_vec().await.unwrap().len(), 3);
    /// # }
    /// ```
    pub fn eval_map<U, F, Fut>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        let f = Arc::new(f);
        staged(self, move |downstream| EvalMapStage {
            downstream,
            f: Arc::clone(&f),
        })
    }

    /// Keep only values for which `predicate` holds.
    pub fn filter<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        staged(self, move |downstream| FilterStage {
            downstream,
            predicate: Arc::clone(&predicate),
        })
    }

    /// Keep only values for which the async `predicate` resolves to `true`.
    pub fn eval_filter<F, Fut>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let predicate = Arc::new(predicate);
        staged(self, move |downstream| EvalFilterStage {
            downstream,
            predicate: Arc::clone(&predicate),
        })
    }

    /// Run a side effect on each value before forwarding it unchanged.
    pub fn on_each<F>(self, action: F) -> Flow<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        staged(self, move |downstream| OnEachStage {
            downstream,
            action: Arc::clone(&action),
        })
    }

    /// Fallible side effect; an error behaves like a [`try_map`](Flow::try_map) failure.
    pub fn try_on_each<E, F>(self, action: F) -> Flow<T>
    where
        E: Display,
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        short_circuited(self, move |downstream, circuit| TryOnEachStage {
            downstream,
            action: Arc::clone(&action),
            circuit,
        })
    }

    /// Suspend for `duration` before forwarding each value.
    pub fn delay_each(self, duration: Duration) -> Flow<T> {
        staged(self, move |downstream| DelayStage {
            downstream,
            duration,
        })
    }

    /// Forward at most the first `n` values, then complete and cancel upstream.
    ///
    /// `take(0)` completes immediately without activating the upstream.
    pub fn take(self, n: usize) -> Flow<T> {
        if n == 0 {
            return empty();
        }
        short_circuited(self, move |downstream, circuit| TakeStage {
            downstream,
            remaining: n,
            circuit,
        })
    }

    /// Forward values while `predicate` holds.
    ///
    /// The first value failing the predicate is dropped, the flow completes
    /// and the upstream is cancelled.
    pub fn take_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.take_while_with(|| (), move |_, value| predicate(value))
    }

    /// [`take_while`](Flow::take_while) with state created fresh for each activation.
    ///
    /// # Examples
    /// ```
    /// use rs2_flow::from_iter;
    /// use std::time::{Duration, Instant};
    ///
    /// # async fn example() {
    /// // Stop forwarding 10ms after this activation started.
    /// let bounded = from_iter(1..=1_000)
    ///     .take_while_with(Instant::now, |started, _| {
    ///         started.elapsed() < Duration::from_millis(10)
    ///     });
    /// let _ = bounded.to_vec().await;
    /// # }
    /// ```
    pub fn take_while_with<S, I, F>(self, init: I, predicate: F) -> Flow<T>
    where
        S: Send + 'static,
        I: Fn() -> S + Send + Sync + 'static,
        F: Fn(&mut S, &T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        short_circuited(self, move |downstream, circuit| TakeWhileStage {
            downstream,
            state: init(),
            predicate: Arc::clone(&predicate),
            circuit,
        })
    }
}
