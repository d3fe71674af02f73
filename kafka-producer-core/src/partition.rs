//! Partition selection (spec §4.2). Resolution against the client's metadata view
//! lives in [`crate::actor`]; this module only covers the partitioner contract and
//! the default round-robin strategy.

use std::collections::HashMap;
use std::sync::Arc;

/// Strategy mapping a topic's known partitions to a single destination partition.
///
/// Takes `&mut self` rather than `&self`: the producer's actor task is the sole
/// owner of the configured partitioner, so cursor state needs no synchronization
/// (spec §5, "no mutex is required").
pub trait Partitioner: Send {
    fn partition(&mut self, topic: &str, partitions: &[i32]) -> i32;

    /// Name used in the producer's diagnostic repr (spec §4.1).
    fn name(&self) -> &'static str;
}

/// Default partitioner: a per-topic cursor advanced once per submission, wrapping
/// around the topic's partition list.
#[derive(Debug, Default)]
pub struct RoundRobinPartitioner {
    cursors: HashMap<Arc<str>, usize>,
}

impl Partitioner for RoundRobinPartitioner {
    fn partition(&mut self, topic: &str, partitions: &[i32]) -> i32 {
        assert!(!partitions.is_empty(), "partition() requires a nonempty partition list");
        let cursor = self.cursors.entry(Arc::from(topic)).or_insert(0);
        let chosen = partitions[*cursor % partitions.len()];
        *cursor = (*cursor + 1) % partitions.len();
        chosen
    }

    fn name(&self) -> &'static str {
        "RoundRobinPartitioner"
    }
}
