//! Batch aggregator & trigger engine (spec §4.3). Owned exclusively by the actor
//! task in [`crate::actor`] — no locking, matching the "no mutex required" model in
//! spec §5.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::ClockInstant;
use crate::config::ProducerConfig;
use crate::submission::QueuedSubmission;

/// A mutable accumulator for one `(topic, partition)`. Created lazily on first
/// submission, drained (removed from the table) the moment a trigger fires.
#[derive(Debug)]
pub(crate) struct PartitionBatch {
    pub topic: Arc<str>,
    pub partition: i32,
    pub submissions: Vec<QueuedSubmission>,
    pub message_count: u32,
    pub byte_count: u64,
    pub created_at: ClockInstant,
}

impl PartitionBatch {
    fn new(topic: Arc<str>, partition: i32, created_at: ClockInstant) -> Self {
        Self {
            topic,
            partition,
            submissions: Vec::new(),
            message_count: 0,
            byte_count: 0,
            created_at,
        }
    }

    fn push(&mut self, submission: QueuedSubmission) {
        self.message_count += submission.messages.len() as u32;
        self.byte_count += submission.byte_len();
        self.submissions.push(submission);
    }

    fn triggered_by_size(&self, config: &ProducerConfig) -> bool {
        self.message_count >= config.batch_every_n || self.byte_count >= config.batch_every_b
    }

    fn triggered_by_age(&self, config: &ProducerConfig, now: ClockInstant) -> bool {
        now.elapsed_since(self.created_at) >= config.batch_every_t()
    }
}

/// `(topic, partition) -> PartitionBatch` registry. Every method either appends to
/// or atomically drains an entry so concurrent submissions always start a fresh
/// batch rather than racing with an in-flight one (spec §4.3).
#[derive(Debug, Default)]
pub(crate) struct BatchTable {
    batches: HashMap<(Arc<str>, i32), PartitionBatch>,
}

impl BatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `submission` to the batch for `(topic, partition)`, creating it if
    /// absent, and report whether a count/byte trigger now fires for it.
    pub fn push(
        &mut self,
        topic: Arc<str>,
        partition: i32,
        submission: QueuedSubmission,
        config: &ProducerConfig,
        now: ClockInstant,
    ) -> bool {
        let key = (topic.clone(), partition);
        let batch = self
            .batches
            .entry(key)
            .or_insert_with(|| PartitionBatch::new(topic, partition, now));
        batch.push(submission);
        batch.triggered_by_size(config)
    }

    /// Remove and return the batch for `(topic, partition)` if one exists, for
    /// immediate dispatch once a trigger has fired.
    pub fn drain(&mut self, topic: &str, partition: i32) -> Option<PartitionBatch> {
        self.batches.remove(&(Arc::from(topic), partition))
    }

    /// Drain every batch whose age now exceeds `batch_every_t` (the timer-tick
    /// trigger). An empty result is a normal, silent no-op (spec §4.3 "Empty tick").
    pub fn drain_aged(&mut self, config: &ProducerConfig, now: ClockInstant) -> Vec<PartitionBatch> {
        let aged: Vec<(Arc<str>, i32)> = self
            .batches
            .iter()
            .filter(|(_, batch)| batch.triggered_by_age(config, now))
            .map(|(key, _)| key.clone())
            .collect();
        aged.into_iter()
            .filter_map(|key| self.batches.remove(&key))
            .collect()
    }

    /// Drain every open batch unconditionally, for shutdown.
    pub fn drain_all(&mut self) -> Vec<PartitionBatch> {
        self.batches.drain().map(|(_, batch)| batch).collect()
    }

    /// Remove a single queued submission by id, searching every open batch.
    /// Returns the submission and whether its batch was left empty (and thus also
    /// removed) so the caller can decide whether anything else needs draining.
    pub fn remove_submission(&mut self, id: u64) -> Option<QueuedSubmission> {
        let mut found_key = None;
        let mut found_index = None;
        'outer: for (key, batch) in self.batches.iter() {
            for (index, submission) in batch.submissions.iter().enumerate() {
                if submission.id == id {
                    found_key = Some(key.clone());
                    found_index = Some(index);
                    break 'outer;
                }
            }
        }
        let key = found_key?;
        let index = found_index?;
        let batch = self.batches.get_mut(&key)?;
        let submission = batch.submissions.remove(index);
        batch.message_count -= submission.messages.len() as u32;
        batch.byte_count -= submission.byte_len();
        if batch.submissions.is_empty() {
            self.batches.remove(&key);
        }
        Some(submission)
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
