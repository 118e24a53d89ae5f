//! Configuration types for flow execution

use serde::{Deserialize, Serialize};
use std::io;
use tokio::runtime::{Builder, Runtime};

/// Capacity of the queue that sits between a bridged producer and its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCapacity {
    /// No buffer: every send waits until the consumer has taken the value
    Rendezvous,
    /// At most `n` values wait in the queue; the producer suspends beyond that
    Bounded(usize),
    /// The producer never suspends
    Unbounded,
}

impl QueueCapacity {
    /// Number of values that may sit in the queue before `send` suspends.
    /// Rendezvous still stores the single value being handed off.
    pub(crate) fn slots(&self) -> usize {
        match self {
            QueueCapacity::Rendezvous => 1,
            QueueCapacity::Bounded(n) => (*n).max(1),
            QueueCapacity::Unbounded => usize::MAX,
        }
    }

    pub(crate) fn is_rendezvous(&self) -> bool {
        matches!(self, QueueCapacity::Rendezvous | QueueCapacity::Bounded(0))
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            QueueCapacity::Rendezvous => Some(0),
            QueueCapacity::Bounded(n) => Some(*n),
            QueueCapacity::Unbounded => None,
        }
    }
}

impl From<usize> for QueueCapacity {
    fn from(n: usize) -> Self {
        if n == 0 {
            QueueCapacity::Rendezvous
        } else {
            QueueCapacity::Bounded(n)
        }
    }
}

/// Channel configuration for `channel_flow`, `flow_on` and `buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub capacity: QueueCapacity,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: QueueCapacity::Bounded(64),
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue capacity
    pub fn capacity(mut self, capacity: impl Into<QueueCapacity>) -> Self {
        self.capacity = capacity.into();
        self
    }

    pub fn rendezvous() -> Self {
        Self::default().capacity(QueueCapacity::Rendezvous)
    }

    pub fn unbounded() -> Self {
        Self::default().capacity(QueueCapacity::Unbounded)
    }
}

/// Threading model of a runtime built from a [`SchedulerConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerFlavor {
    /// One thread, cooperative scheduling; a UI-affine style delivery context
    CurrentThread,
    /// A pool of worker threads for blocking or IO-bound producer work
    MultiThread,
}

/// Configuration for a runtime that backs a scheduler context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub name: String,
    pub worker_threads: usize,
    pub flavor: SchedulerFlavor,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "flow-io".to_string(),
            worker_threads: num_cpus::get(),
            flavor: SchedulerFlavor::MultiThread,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-threaded delivery context
    pub fn main() -> Self {
        Self {
            name: "flow-main".to_string(),
            worker_threads: 1,
            flavor: SchedulerFlavor::CurrentThread,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    pub fn flavor(mut self, flavor: SchedulerFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Name given to every thread of the built runtime
    pub fn thread_name(&self) -> String {
        format!("{}-worker", self.name)
    }

    /// Build the tokio runtime described by this configuration.
    ///
    /// The caller owns the runtime and must keep it alive for as long as
    /// contexts created from its handle are in use.
    pub fn build_runtime(&self) -> io::Result<Runtime> {
        let mut builder = match self.flavor {
            SchedulerFlavor::CurrentThread => Builder::new_current_thread(),
            SchedulerFlavor::MultiThread => {
                let mut builder = Builder::new_multi_thread();
                builder.worker_threads(self.worker_threads.max(1));
                builder
            }
        };
        builder.thread_name(self.thread_name()).enable_all().build()
    }
}
