//! Reusable flow transformations
//!
//! A [`Pipe`] captures a chain of operators once so it can be applied to
//! any number of flows. Applying a pipe only builds a new cold flow; nothing
//! runs until that flow is activated.

use crate::flow::Flow;
use std::sync::Arc;

/// A named-by-type `Flow<I> -> Flow<O>` transformation
pub struct Pipe<I, O> {
    f: Arc<dyn Fn(Flow<I>) -> Flow<O> + Send + Sync + 'static>,
}

impl<I, O> Clone for Pipe<I, O> {
    fn clone(&self) -> Self {
        Pipe {
            f: Arc::clone(&self.f),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Pipe<I, O> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Flow<I>) -> Flow<O> + Send + Sync + 'static,
    {
        Pipe { f: Arc::new(f) }
    }

    /// Build the transformed flow.
    pub fn apply(&self, input: Flow<I>) -> Flow<O> {
        (self.f)(input)
    }

    /// Feed this pipe's output into `next`.
    ///
    /// # Examples
    /// ```
    /// use rs2_flow::{from_iter, pipe};
    ///
    /// # async fn example() {
    /// let odd_labels = pipe::filter(|x: &i32| x % 2 != 0).then(pipe::map(|x: i32| format!("#{}", x)));
    /// let labels = from_iter(1..=5).through(&odd_labels).to_vec().await.unwrap();
    /// assert_eq!(labels, vec!["#1", "#3", "#5"]);
    /// # }
    /// ```
    pub fn then<P: Send + 'static>(self, next: Pipe<O, P>) -> Pipe<I, P> {
        compose(self, next)
    }
}

/// Transform each value
pub fn map<I, O, F>(f: F) -> Pipe<I, O>
where
    F: Fn(I) -> O + Send + Sync + Clone + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    Pipe::new(move |input: Flow<I>| input.map(f.clone()))
}

/// Transform each value with an async function
pub fn eval_map<I, O, F, Fut>(f: F) -> Pipe<I, O>
where
    F: Fn(I) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = O> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    Pipe::new(move |input: Flow<I>| input.eval_map(f.clone()))
}

pub fn filter<I, F>(predicate: F) -> Pipe<I, I>
where
    F: Fn(&I) -> bool + Send + Sync + Clone + 'static,
    I: Send + 'static,
{
    Pipe::new(move |input: Flow<I>| input.filter(predicate.clone()))
}

/// Forward at most `n` values; the upstream of every flow it is applied to
/// is cancelled once they are through.
pub fn take<I: Send + 'static>(n: usize) -> Pipe<I, I> {
    Pipe::new(move |input: Flow<I>| input.take(n))
}

pub fn take_while<I, F>(predicate: F) -> Pipe<I, I>
where
    F: Fn(&I) -> bool + Send + Sync + Clone + 'static,
    I: Send + 'static,
{
    Pipe::new(move |input: Flow<I>| input.take_while(predicate.clone()))
}

/// `first`, then `second`
pub fn compose<I, M, O>(first: Pipe<I, M>, second: Pipe<M, O>) -> Pipe<I, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    Pipe::new(move |input| second.apply(first.apply(input)))
}

/// Pipe that hands the flow back untouched
pub fn identity<I: Send + 'static>() -> Pipe<I, I> {
    Pipe::new(|input| input)
}

impl<T: Send + 'static> Flow<T> {
    /// Apply a reusable [`Pipe`] to this flow.
    pub fn through<O: Send + 'static>(self, pipe: &Pipe<T, O>) -> Flow<O> {
        pipe.apply(self)
    }
}
