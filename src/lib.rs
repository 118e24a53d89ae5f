pub mod cancellation;
pub mod error;
pub mod flow;
pub mod flow_configuration;
pub mod pipe;
pub mod queue;
pub mod scheduler;

// Re-export the flow engine at the crate root
pub use cancellation::CancellationToken;
pub use error::{FlowError, FlowResult};
pub use flow::{
    channel_flow, channel_flow_with, empty, failed, flow_of, from_iter, from_stream_fn,
    Activation, Emitter, Flow, FlowCollector, ProducerScope, Subscriber, Termination,
};
pub use flow_configuration::{ChannelConfig, QueueCapacity, SchedulerConfig, SchedulerFlavor};
pub use scheduler::SchedulerContext;
