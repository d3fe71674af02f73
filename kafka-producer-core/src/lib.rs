//! Coordination core for an asynchronous Kafka producer: submission intake,
//! partition resolution, batch aggregation, dispatch with bounded retries,
//! partial-failure response demultiplexing, and graceful shutdown.
//!
//! The wire codec, TCP framing, and topic-metadata client are external
//! collaborators reached through [`client::Client`]; this crate only coordinates
//! them.

mod actor;
mod batch;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
mod demux;
mod dispatch;
pub mod error;
pub mod partition;
mod producer;
mod retry;
mod shutdown;
mod submission;

pub use client::{
    Acks, Client, FailedPayloadsReply, ProduceReply, ProduceRequest, ProduceResponse,
    PRODUCER_ACK_NOT_REQUIRED,
};
pub use codec::Codec;
pub use config::ProducerConfig;
pub use error::ProducerError;
pub use partition::{Partitioner, RoundRobinPartitioner};
pub use producer::{Producer, ProducerBuilder, SendHandle, StopHandle};
