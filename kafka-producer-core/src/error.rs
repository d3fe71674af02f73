//! Error taxonomy surfaced to callers and used internally to decide retry eligibility.

use std::sync::Arc;
use thiserror::Error;

/// Errors a submission's handle can resolve with, or that can terminate metadata
/// resolution for every submission waiting on a topic.
///
/// Variant names are carried verbatim from the upstream client's error taxonomy so a
/// caller migrating from it can match on the same concepts.
#[derive(Debug, Clone, Error)]
pub enum ProducerError {
    #[error("unsupported codec: {0}")]
    UnsupportedCodecError(String),

    #[error("unknown topic or partition: {topic}")]
    UnknownTopicOrPartitionError { topic: Arc<str> },

    #[error("broker not available")]
    BrokerNotAvailableError,

    #[error("leader not available for partition")]
    LeaderNotAvailableError,

    #[error("offset out of range")]
    OffsetOutOfRangeError,

    #[error("no response received from broker")]
    NoResponseError,

    #[error("failed payload: {reason}")]
    FailedPayloadsError { reason: String },

    #[error("submission cancelled")]
    CancelledError,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unexpected failure in dispatch: {0}")]
    Unexpected(String),

    #[error("producer is shutting down")]
    ShuttingDown,
}

impl ProducerError {
    /// Transient broker conditions are eligible for retry; everything else is terminal
    /// on the attempt that produced it. `OffsetOutOfRangeError` is retried until
    /// `max_req_attempts` is exhausted (spec §4.4: "terminal" only once attempts are
    /// exhausted), matching the original producer's observed retry behavior.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProducerError::BrokerNotAvailableError
                | ProducerError::LeaderNotAvailableError
                | ProducerError::OffsetOutOfRangeError
                | ProducerError::FailedPayloadsError { .. }
        )
    }
}
