//! The in-flight representation of one caller submission once it has been assigned
//! a partition and is sitting in a [`crate::batch::PartitionBatch`] or traveling with
//! a dispatch unit. The public-facing submission API lives in
//! [`crate::producer`]; this type is the internal, already-resolved shape the
//! aggregator and dispatcher operate on (spec §3, "Submission").

use bytes::Bytes;

/// A submission after partition resolution, identified by the id the actor assigned
/// it at intake. `id` is what [`crate::actor`]'s pending registry and
/// cancellation bookkeeping key off of.
#[derive(Debug)]
pub(crate) struct QueuedSubmission {
    pub id: u64,
    pub messages: Vec<Bytes>,
}

impl QueuedSubmission {
    pub fn byte_len(&self) -> u64 {
        self.messages.iter().map(|m| m.len() as u64).sum()
    }
}
