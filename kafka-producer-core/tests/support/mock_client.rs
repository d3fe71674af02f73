//! An in-process stand-in for the Kafka client, analogous to the upstream
//! source's `Mock()` client and to `personhog-router`'s `MockBackend`: canned
//! replies are queued up front, and every call is recorded so assertions can
//! inspect exactly what the dispatch controller sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use kafka_producer_core::{Acks, Client, ProduceReply, ProduceRequest, ProducerError};

#[derive(Debug, Default)]
pub struct MockClient {
    partitions: Mutex<HashMap<String, Vec<i32>>>,
    metadata_errors: Mutex<HashMap<String, i32>>,
    produce_replies: Mutex<VecDeque<Result<ProduceReply, ProducerError>>>,
    produce_calls: Mutex<Vec<Vec<ProduceRequest>>>,
    metadata_calls: Mutex<Vec<Vec<Arc<str>>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_partitions(&self, topic: &str, partitions: Vec<i32>) {
        self.partitions
            .lock()
            .unwrap()
            .insert(topic.to_string(), partitions);
    }

    pub fn set_metadata_error(&self, topic: &str, code: i32) {
        self.metadata_errors
            .lock()
            .unwrap()
            .insert(topic.to_string(), code);
    }

    pub fn queue_reply(&self, reply: Result<ProduceReply, ProducerError>) {
        self.produce_replies.lock().unwrap().push_back(reply);
    }

    /// Every `send_produce_request` call observed so far, in order.
    pub fn produce_calls(&self) -> Vec<Vec<ProduceRequest>> {
        self.produce_calls.lock().unwrap().clone()
    }

    pub fn metadata_calls(&self) -> Vec<Vec<Arc<str>>> {
        self.metadata_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Client for MockClient {
    async fn send_produce_request(
        &self,
        requests: Vec<ProduceRequest>,
        _acks: Acks,
        _timeout: Duration,
    ) -> Result<ProduceReply, ProducerError> {
        self.produce_calls.lock().unwrap().push(requests);
        self.produce_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ProduceReply::Responses(Vec::new())))
    }

    async fn load_metadata_for_topics(&self, topics: Vec<Arc<str>>) -> Result<(), ProducerError> {
        self.metadata_calls.lock().unwrap().push(topics);
        Ok(())
    }

    fn topic_partitions(&self, topic: &str) -> Option<Vec<i32>> {
        self.partitions.lock().unwrap().get(topic).cloned()
    }

    fn metadata_error_for_topic(&self, topic: &str) -> i32 {
        *self
            .metadata_errors
            .lock()
            .unwrap()
            .get(topic)
            .unwrap_or(&0)
    }
}
