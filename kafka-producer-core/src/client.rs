//! The Kafka client contract this crate consumes. The wire codec, TCP framing, and
//! topic-metadata client that sit behind this trait are out of scope (spec §1b).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProducerError;

/// Broker acknowledgement level. Carries the same wire values as the upstream
/// constants (`PRODUCER_ACK_NOT_REQUIRED = 0`, leader = 1, all = -1) but as a typed
/// enum rather than a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    None,
    Leader,
    All,
}

/// The wire value of [`Acks::None`]; kept as a named constant for parity with the
/// upstream `PRODUCER_ACK_NOT_REQUIRED`.
pub const PRODUCER_ACK_NOT_REQUIRED: i16 = 0;

impl From<Acks> for i16 {
    fn from(acks: Acks) -> i16 {
        match acks {
            Acks::None => 0,
            Acks::Leader => 1,
            Acks::All => -1,
        }
    }
}

impl TryFrom<i16> for Acks {
    type Error = ProducerError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Acks::None),
            1 => Ok(Acks::Leader),
            -1 => Ok(Acks::All),
            other => Err(ProducerError::Validation(format!(
                "unrecognized req_acks value: {other}"
            ))),
        }
    }
}

/// A wire-ready request for one partition, one encoded message set.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub topic: Arc<str>,
    pub partition: i32,
    pub message_set: Bytes,
}

/// A broker's reply for one partition of a produce request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topic: Arc<str>,
    pub partition: i32,
    pub error_code: i16,
    pub offset: i64,
}

/// The partial-success envelope a client returns when `fail_on_error = false` and at
/// least one, but not all, dispatched requests failed.
#[derive(Debug, Clone)]
pub struct FailedPayloadsReply {
    #[allow(missing_docs)]
    pub successful: Vec<ProduceResponse>,
    pub failed: Vec<(ProduceRequest, ProducerError)>,
}

/// The three reply shapes a produce call can settle with (spec §4.5).
#[derive(Debug, Clone)]
pub enum ProduceReply {
    Responses(Vec<ProduceResponse>),
    Partial(FailedPayloadsReply),
}

/// The external collaborator this crate's dispatch and partition-resolution logic is
/// built against. Implementations own the actual broker connection; this crate never
/// talks wire protocol directly.
#[async_trait]
pub trait Client: Send + Sync + fmt::Debug {
    /// Issue one produce call covering all given requests. Must be called with
    /// `fail_on_error = false` semantics: per-partition failures are surfaced via
    /// [`ProduceReply::Partial`] rather than failing the whole call.
    async fn send_produce_request(
        &self,
        requests: Vec<ProduceRequest>,
        acks: Acks,
        timeout: Duration,
    ) -> Result<ProduceReply, ProducerError>;

    /// Refresh the `topic_partitions` view (and per-topic error view) for the given
    /// topics. Side-effecting: callers re-consult [`Client::topic_partitions`] after
    /// this resolves.
    async fn load_metadata_for_topics(&self, topics: Vec<Arc<str>>) -> Result<(), ProducerError>;

    /// The ordered partition list known for `topic`, if metadata has been loaded.
    fn topic_partitions(&self, topic: &str) -> Option<Vec<i32>>;

    /// Non-zero if the last metadata load recorded an error for this topic.
    fn metadata_error_for_topic(&self, topic: &str) -> i32;
}
