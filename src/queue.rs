//! Bounded hand-off queue between one producer and one consumer
//!
//! Backs the hot bridge (`channel_flow`, `flow_on`, `buffer`). Bounded and
//! unbounded queues are tokio `mpsc` channels. A rendezvous queue is a
//! one-slot channel whose values carry a `oneshot` that the consumer fires
//! when it takes the value, so [`QueueSender::send`] returns only after the
//! hand-off. Each end is handed out once; the queue ends when the producer
//! end is dropped and everything sent has been drained.

use crate::error::{FlowError, FlowResult};
use crate::flow_configuration::QueueCapacity;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Error returned by [`QueueSender::try_send`]; hands the value back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// No free slot right now
    Full(T),
    /// The consumer has terminated
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(value) | TrySendError::Closed(value) => value,
        }
    }
}

/// A queued value, with the hand-off acknowledgement of a rendezvous send
struct Envelope<T> {
    value: T,
    taken: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    fn open(self) -> T {
        if let Some(taken) = self.taken {
            let _ = taken.send(());
        }
        self.value
    }
}

enum Tx<T> {
    Bounded(mpsc::Sender<Envelope<T>>),
    Unbounded(mpsc::UnboundedSender<Envelope<T>>),
}

enum Rx<T> {
    Bounded(mpsc::Receiver<Envelope<T>>),
    Unbounded(mpsc::UnboundedReceiver<Envelope<T>>),
}

struct Ends<T> {
    sender: Option<Tx<T>>,
    receiver: Option<Rx<T>>,
}

struct QueueState<T> {
    ends: Mutex<Ends<T>>,
    capacity: QueueCapacity,
    item_count: AtomicUsize,
    sender_closed: AtomicBool,
    receiver_closed: AtomicBool,
}

impl<T> QueueState<T> {
    fn ends(&self) -> std::sync::MutexGuard<'_, Ends<T>> {
        self.ends.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn taken_out(&self) {
        // Never below zero: a value is counted before it becomes receivable.
        let _ = self
            .item_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Single-producer, single-consumer queue with a fixed capacity policy
pub struct BoundedQueue<T> {
    state: Arc<QueueState<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send> BoundedQueue<T> {
    pub fn new(capacity: QueueCapacity) -> Self {
        let (sender, receiver) = match capacity {
            QueueCapacity::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Tx::Unbounded(tx), Rx::Unbounded(rx))
            }
            bounded => {
                // A rendezvous holds the single value being handed off.
                let (tx, rx) = mpsc::channel(bounded.slots());
                (Tx::Bounded(tx), Rx::Bounded(rx))
            }
        };
        Self {
            state: Arc::new(QueueState {
                ends: Mutex::new(Ends {
                    sender: Some(sender),
                    receiver: Some(receiver),
                }),
                capacity,
                item_count: AtomicUsize::new(0),
                sender_closed: AtomicBool::new(false),
                receiver_closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a bounded queue with the given capacity; `0` is a rendezvous.
    pub fn bounded(capacity: usize) -> Self {
        Self::new(QueueCapacity::from(capacity))
    }

    pub fn unbounded() -> Self {
        Self::new(QueueCapacity::Unbounded)
    }

    /// Take the producer end. Only one producer may ever exist.
    pub fn take_sender(&self) -> FlowResult<QueueSender<T>> {
        let sender = self
            .state
            .ends()
            .sender
            .take()
            .ok_or_else(|| FlowError::usage("queue producer end was already taken"))?;
        Ok(QueueSender {
            sender,
            state: Arc::clone(&self.state),
        })
    }

    /// Take the consumer end. A queue is single use: once its consumer has
    /// been handed out it cannot be drained again.
    pub fn take_receiver(&self) -> FlowResult<QueueReceiver<T>> {
        let receiver = self.state.ends().receiver.take().ok_or_else(|| {
            FlowError::usage("queue consumer end was already taken; a queue cannot be drained twice")
        })?;
        Ok(QueueReceiver {
            receiver,
            state: Arc::clone(&self.state),
        })
    }

    pub fn capacity(&self) -> QueueCapacity {
        self.state.capacity
    }

    pub fn len(&self) -> usize {
        self.state.item_count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.sender_closed.load(Ordering::Acquire)
            || self.state.receiver_closed.load(Ordering::Acquire)
    }

    /// Get queue statistics for monitoring
    pub fn stats(&self) -> QueueStats {
        let length = self.len();
        let capacity = self.state.capacity.limit();
        let utilization = match capacity {
            Some(cap) if cap > 0 => length as f64 / cap as f64,
            _ => 0.0,
        };
        QueueStats {
            length,
            capacity,
            utilization,
            is_closed: self.is_closed(),
        }
    }
}

/// Producer end of a [`BoundedQueue`]; dropping it ends the queue
pub struct QueueSender<T> {
    sender: Tx<T>,
    state: Arc<QueueState<T>>,
}

impl<T: Send> QueueSender<T> {
    /// Enqueue a value, suspending while the queue is full.
    ///
    /// On a rendezvous queue this also waits until the consumer has taken
    /// the value. Fails with [`FlowError::Closed`] once the consumer has
    /// terminated.
    pub async fn send(&self, value: T) -> FlowResult<()> {
        if !self.state.capacity.is_rendezvous() {
            return self.push(Envelope { value, taken: None }).await;
        }
        let (taken, handed_off) = oneshot::channel();
        self.push(Envelope {
            value,
            taken: Some(taken),
        })
        .await?;
        // A consumer that closes drops the envelope unopened.
        handed_off.await.map_err(|_| FlowError::Closed)
    }

    async fn push(&self, envelope: Envelope<T>) -> FlowResult<()> {
        match &self.sender {
            Tx::Bounded(tx) => {
                let permit = tx.reserve().await.map_err(|_| FlowError::Closed)?;
                self.state.item_count.fetch_add(1, Ordering::AcqRel);
                permit.send(envelope);
                Ok(())
            }
            Tx::Unbounded(tx) => {
                self.state.item_count.fetch_add(1, Ordering::AcqRel);
                tx.send(envelope).map_err(|_| {
                    self.state.taken_out();
                    FlowError::Closed
                })
            }
        }
    }

    /// Enqueue without suspending. A rendezvous queue never has a free slot.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        if self.is_closed() {
            return Err(TrySendError::Closed(value));
        }
        if self.state.capacity.is_rendezvous() {
            return Err(TrySendError::Full(value));
        }
        let envelope = Envelope { value, taken: None };
        match &self.sender {
            Tx::Bounded(tx) => match tx.try_reserve() {
                Ok(permit) => {
                    self.state.item_count.fetch_add(1, Ordering::AcqRel);
                    permit.send(envelope);
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Full(())) => Err(TrySendError::Full(envelope.value)),
                Err(mpsc::error::TrySendError::Closed(())) => {
                    Err(TrySendError::Closed(envelope.value))
                }
            },
            Tx::Unbounded(tx) => {
                self.state.item_count.fetch_add(1, Ordering::AcqRel);
                tx.send(envelope).map_err(|rejected| {
                    self.state.taken_out();
                    TrySendError::Closed(rejected.0.value)
                })
            }
        }
    }

    /// True once the consumer has terminated.
    pub fn is_closed(&self) -> bool {
        match &self.sender {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded(tx) => tx.is_closed(),
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.state.sender_closed.store(true, Ordering::Release);
    }
}

/// Consumer end of a [`BoundedQueue`]
pub struct QueueReceiver<T> {
    receiver: Rx<T>,
    state: Arc<QueueState<T>>,
}

impl<T: Send> QueueReceiver<T> {
    /// Dequeue the next value in FIFO order.
    ///
    /// Suspends while the queue is empty; returns `None` once the producer
    /// end is gone and everything it sent has been drained.
    pub async fn recv(&mut self) -> Option<T> {
        let envelope = match &mut self.receiver {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }?;
        self.state.taken_out();
        Some(envelope.open())
    }

    pub fn try_recv(&mut self) -> Option<T> {
        let envelope = match &mut self.receiver {
            Rx::Bounded(rx) => rx.try_recv().ok(),
            Rx::Unbounded(rx) => rx.try_recv().ok(),
        }?;
        self.state.taken_out();
        Some(envelope.open())
    }

    /// Terminate the consumer side, releasing buffered values and waking the producer.
    pub fn close(&mut self) {
        self.state.receiver_closed.store(true, Ordering::Release);
        match &mut self.receiver {
            Rx::Bounded(rx) => {
                rx.close();
                while rx.try_recv().is_ok() {}
            }
            Rx::Unbounded(rx) => {
                rx.close();
                while rx.try_recv().is_ok() {}
            }
        }
        self.state.item_count.store(0, Ordering::Release);
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        self.state.receiver_closed.store(true, Ordering::Release);
    }
}

/// Queue statistics for monitoring and debugging
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub length: usize,
    pub capacity: Option<usize>,
    pub utilization: f64, // 0.0 to 1.0 for bounded queues
    pub is_closed: bool,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let closed = if self.is_closed { ", closed" } else { "" };
        match self.capacity {
            Some(0) => write!(f, "Queue({}, rendezvous{})", self.length, closed),
            Some(cap) => write!(
                f,
                "Queue({}/{}, {:.1}%{})",
                self.length,
                cap,
                self.utilization * 100.0,
                closed
            ),
            None => write!(f, "Queue({}, unbounded{})", self.length, closed),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.state.capacity)
            .field("length", &self.state.item_count.load(Ordering::Acquire))
            .field("sender_closed", &self.state.sender_closed.load(Ordering::Acquire))
            .field(
                "receiver_closed",
                &self.state.receiver_closed.load(Ordering::Acquire),
            )
            .finish()
    }
}
