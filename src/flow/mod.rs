//! Cold flow engine
//!
//! A flow is defined once and activated any number of times. Operators
//! build new flows around existing ones; activation drives the producer
//! through every stage into the consumer.

pub mod activation;
pub mod channel;
pub mod constructors;
pub mod core;
pub mod operators;

pub use activation::{Activation, Subscriber, Termination};
pub use channel::{channel_flow, channel_flow_with, ProducerScope};
pub use constructors::{empty, failed, flow_of, from_iter, from_stream_fn};
pub use self::core::{Emitter, Flow, FlowCollector};
