//! Flow constructors
//!
//! Each constructor only captures its inputs; values are produced when the
//! returned flow is activated, and again on every later activation.

use crate::error::FlowError;
use crate::flow::core::Flow;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use std::sync::Arc;

/// Create a flow that emits each of `values` in order, then completes.
///
/// # Examples
/// ```
/// use rs2_flow::flow_of;
///
/// # async fn example() {
/// let fixed = flow_of(vec![1, 2, 3, 4, 5]);
/// assert_eq!(fixed.to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);
/// // Cold: a second activation replays the same values.
/// assert_eq!(fixed.to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);
/// # }
/// ```
pub fn flow_of<T, V>(values: V) -> Flow<T>
where
    T: Clone + Send + Sync + 'static,
    V: Into<Vec<T>>,
{
    let values: Arc<[T]> = Arc::from(values.into());
    Flow::define(move |mut out| {
        let values = Arc::clone(&values);
        async move {
            for value in values.iter() {
                out.emit(value.clone()).await?;
            }
            Ok(())
        }
    })
}

/// Create a flow from anything that can be iterated repeatedly, such as a
/// range or a collection.
pub fn from_iter<I, T>(iterable: I) -> Flow<T>
where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    T: Send + 'static,
{
    Flow::define(move |mut out| {
        let iter = iterable.clone().into_iter();
        async move {
            for value in iter {
                out.emit(value).await?;
            }
            Ok(())
        }
    })
}

/// Create a flow that completes immediately without emitting anything.
pub fn empty<T: Send + 'static>() -> Flow<T> {
    Flow::define(|_out| async { Ok(()) })
}

/// Create a flow that fails immediately with `error`.
pub fn failed<T: Send + 'static>(error: FlowError) -> Flow<T> {
    Flow::define(move |_out| {
        let error = error.clone();
        async move { Err(error) }
    })
}

/// Adapt a factory of `futures` streams into a cold flow.
///
/// The factory is invoked once per activation, so every activation reads a
/// fresh stream.
pub fn from_stream_fn<S, F>(factory: F) -> Flow<S::Item>
where
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    Flow::define(move |mut out| {
        let stream = factory();
        async move {
            pin_mut!(stream);
            while let Some(value) = stream.next().await {
                out.emit(value).await?;
            }
            Ok(())
        }
    })
}
