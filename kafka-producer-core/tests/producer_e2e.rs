//! End-to-end scenarios against the producer's public API, driven through a
//! [`MockClient`] and a [`VirtualClock`] so retry back-off and batch-time
//! triggers advance deterministically instead of sleeping in real time
//! (spec §8, literal scenarios 1-8).

mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use kafka_producer_core::clock::VirtualClock;
use kafka_producer_core::codec::{create_message_set, Codec};
use kafka_producer_core::{
    FailedPayloadsReply, ProduceReply, ProduceResponse, Producer, ProducerConfig, ProducerError,
};
use support::mock_client::MockClient;

/// Cooperatively yield until the mock has recorded at least `n` produce calls, or
/// panic. Replaces a timing-based `sleep` with a bound on scheduler turns, since the
/// only real timing in these tests is driven explicitly through [`VirtualClock`].
async fn until_produce_calls_at_least(client: &MockClient, n: usize) {
    for _ in 0..10_000 {
        if client.produce_calls().len() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {n} produce call(s)");
}

/// Let freshly spawned background tasks (the batch-time timer, dispatch tasks) reach
/// their first await point before the test advances the virtual clock. Without this,
/// advancing before a timer's `clock.sleep(...)` call has actually registered would
/// compute that sleep's wake-up relative to the already-advanced `now`, missing the
/// window the test means to trigger.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

async fn until_metadata_calls_at_least(client: &MockClient, n: usize) {
    for _ in 0..10_000 {
        if client.metadata_calls().len() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {n} metadata call(s)");
}

fn unbatched_config(req_acks: i16, ack_timeout_ms: u64) -> ProducerConfig {
    ProducerConfig {
        req_acks,
        ack_timeout_ms,
        batch_send: false,
        ..ProducerConfig::default()
    }
}

#[tokio::test]
async fn unbatched_happy_path() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23, 101, 102, 103]);
    client.queue_reply(Ok(ProduceReply::Responses(vec![ProduceResponse {
        topic: Arc::from("T"),
        partition: 23,
        error_code: 0,
        offset: 10,
    }])));

    let producer = Producer::builder(client.clone())
        .config(unbatched_config(1, 5))
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one"), Bytes::from("two")]);
    let response = handle.await.expect("handle resolves").expect("ack present");
    assert_eq!(response.topic.as_ref(), "T");
    assert_eq!(response.partition, 23);
    assert_eq!(response.offset, 10);

    let calls = client.produce_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[0][0].topic.as_ref(), "T");
    assert_eq!(calls[0][0].partition, 23);
    let expected = create_message_set(&[Bytes::from("one"), Bytes::from("two")], Codec::None);
    assert_eq!(calls[0][0].message_set, expected);
}

#[tokio::test]
async fn acks_not_required_resolves_with_null_sentinel() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23, 101, 102, 103]);
    client.queue_reply(Ok(ProduceReply::Responses(Vec::new())));

    let producer = Producer::builder(client.clone())
        .config(unbatched_config(0, 5))
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one"), Bytes::from("two")]);
    let response = handle.await.expect("handle resolves");
    assert!(response.is_none());
    assert_eq!(client.produce_calls().len(), 1);
}

#[tokio::test]
async fn no_retries_hard_fail() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);
    client.queue_reply(Err(ProducerError::BrokerNotAvailableError));

    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            max_req_attempts: 1,
            ..unbatched_config(1, 5)
        })
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one")]);
    let err = handle.await.expect_err("expected terminal failure");
    assert!(matches!(err, ProducerError::BrokerNotAvailableError));
    assert_eq!(client.produce_calls().len(), 1);
}

#[tokio::test]
async fn batched_partial_success_retries_only_failed_partition() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);
    client.queue_reply(Ok(ProduceReply::Partial(FailedPayloadsReply {
        successful: Vec::new(),
        failed: vec![(
            kafka_producer_core::ProduceRequest {
                topic: Arc::from("T"),
                partition: 23,
                message_set: Bytes::new(),
            },
            ProducerError::BrokerNotAvailableError,
        )],
    })));
    client.queue_reply(Ok(ProduceReply::Responses(vec![ProduceResponse {
        topic: Arc::from("T"),
        partition: 23,
        error_code: 0,
        offset: 99,
    }])));

    let clock = Arc::new(VirtualClock::new());
    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            batch_send: true,
            batch_every_n: 2,
            batch_every_b: u64::MAX,
            batch_every_t_secs: 9_999,
            max_req_attempts: 3,
            retry_interval_ms: 100,
            ..unbatched_config(1, 5)
        })
        .clock(clock.clone())
        .build()
        .expect("valid config");

    let h1 = producer.send_messages("T", vec![Bytes::from("one")]);
    let h2 = producer.send_messages("T", vec![Bytes::from("two")]);

    until_produce_calls_at_least(&client, 1).await;
    clock.advance(Duration::from_millis(100));
    until_produce_calls_at_least(&client, 2).await;

    let (r1, r2) = tokio::join!(h1, h2);
    let r1 = r1.expect("handle 1 resolves").expect("ack present");
    let r2 = r2.expect("handle 2 resolves").expect("ack present");
    assert_eq!(r1.offset, 99);
    assert_eq!(r2.offset, 99);

    let calls = client.produce_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 1, "both submissions share one partition batch");
}

#[tokio::test]
async fn bounded_retries_exhausted_surfaces_final_error() {
    // Spec §8 scenario 5, literal: batch_every_t=5, max_req_attempts=3, three
    // sequential replies OffsetOutOfRangeError / BrokerNotAvailableError /
    // LeaderNotAvailableError. OffsetOutOfRangeError is retried like any other
    // transient condition (see ProducerError::is_transient) and is only terminal
    // once attempts are exhausted, so the third reply's error is what surfaces.
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);
    client.queue_reply(Err(ProducerError::OffsetOutOfRangeError));
    client.queue_reply(Err(ProducerError::BrokerNotAvailableError));
    client.queue_reply(Err(ProducerError::LeaderNotAvailableError));

    let clock = Arc::new(VirtualClock::new());
    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            batch_send: true,
            batch_every_n: 1_000,
            batch_every_b: u64::MAX,
            batch_every_t_secs: 5,
            max_req_attempts: 3,
            retry_interval_ms: 50,
            ..unbatched_config(1, 5)
        })
        .clock(clock.clone())
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one")]);

    settle().await;
    clock.advance(Duration::from_secs(5));
    until_produce_calls_at_least(&client, 1).await;
    clock.advance(Duration::from_millis(50));
    until_produce_calls_at_least(&client, 2).await;
    clock.advance(Duration::from_secs_f64(0.050 * 1.1));
    until_produce_calls_at_least(&client, 3).await;

    let err = handle.await.expect_err("expected terminal failure");
    assert!(matches!(err, ProducerError::LeaderNotAvailableError));
    assert_eq!(client.produce_calls().len(), 3);
}

#[tokio::test]
async fn cancel_while_waiting_to_retry() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);
    client.queue_reply(Err(ProducerError::BrokerNotAvailableError));

    let clock = Arc::new(VirtualClock::new());
    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            max_req_attempts: 5,
            retry_interval_ms: 100,
            ..unbatched_config(1, 5)
        })
        .clock(clock.clone())
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one")]);

    until_produce_calls_at_least(&client, 1).await;
    clock.advance(Duration::from_millis(50));

    let stop = producer.stop();
    let err = handle.await.expect_err("expected cancellation");
    assert!(matches!(err, ProducerError::CancelledError));
    stop.await;
    assert_eq!(client.produce_calls().len(), 1);
}

#[tokio::test]
async fn cancel_before_dispatch_never_appears_on_the_wire() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);

    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            batch_send: true,
            batch_every_n: 3,
            batch_every_b: u64::MAX,
            batch_every_t_secs: 9_999,
            ..unbatched_config(1, 5)
        })
        .build()
        .expect("valid config");

    let h1 = producer.send_messages("T", vec![Bytes::from("a"), Bytes::from("b")]);
    h1.cancel();
    let err = h1.await.expect_err("expected cancellation");
    assert!(matches!(err, ProducerError::CancelledError));
    assert!(client.produce_calls().is_empty());

    let h2 = producer.send_messages("T", vec![Bytes::from("c"), Bytes::from("d")]);
    assert!(client.produce_calls().is_empty());

    let still_pending = tokio::time::timeout(Duration::from_millis(20), h2).await;
    assert!(
        still_pending.is_err(),
        "second submission should remain unresolved until its batch fills"
    );
    assert!(client.produce_calls().is_empty());
}

#[tokio::test]
async fn empty_message_list_is_rejected_synchronously() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);

    let producer = Producer::builder(client.clone())
        .config(unbatched_config(1, 5))
        .build()
        .expect("valid config");

    let err = producer
        .send_messages("T", Vec::new())
        .await
        .expect_err("empty message list must fail validation");
    assert!(matches!(err, ProducerError::Validation(_)));
    assert!(client.produce_calls().is_empty());
}

#[tokio::test]
async fn time_trigger_dispatches_an_otherwise_open_batch() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);
    client.queue_reply(Ok(ProduceReply::Responses(vec![ProduceResponse {
        topic: Arc::from("T"),
        partition: 23,
        error_code: 0,
        offset: 1,
    }])));

    let clock = Arc::new(VirtualClock::new());
    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            batch_send: true,
            batch_every_n: 1_000,
            batch_every_b: u64::MAX,
            batch_every_t_secs: 5,
            ..unbatched_config(1, 5)
        })
        .clock(clock.clone())
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one")]);
    assert!(client.produce_calls().is_empty(), "count/byte triggers must not fire yet");

    settle().await;
    clock.advance(Duration::from_secs(5));
    let response = handle.await.expect("handle resolves").expect("ack present");
    assert_eq!(response.offset, 1);
    assert_eq!(client.produce_calls().len(), 1);
}

#[tokio::test]
async fn stop_cancels_open_batches_and_resolves_once_drained() {
    let client = Arc::new(MockClient::new());
    client.set_partitions("T", vec![23]);

    let producer = Producer::builder(client.clone())
        .config(ProducerConfig {
            batch_send: true,
            batch_every_n: 1_000,
            batch_every_b: u64::MAX,
            batch_every_t_secs: 9_999,
            ..unbatched_config(1, 5)
        })
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one")]);
    producer.stop().await;

    let err = handle.await.expect_err("expected cancellation on shutdown");
    assert!(matches!(err, ProducerError::CancelledError));
    assert!(client.produce_calls().is_empty());

    // Idempotent: a second stop() call resolves immediately.
    producer.stop().await;
}

#[tokio::test]
async fn unknown_topic_fails_without_issuing_a_produce_request() {
    let client = Arc::new(MockClient::new());
    client.set_metadata_error("T", 3);

    let producer = Producer::builder(client.clone())
        .config(unbatched_config(1, 5))
        .build()
        .expect("valid config");

    let handle = producer.send_messages("T", vec![Bytes::from("one")]);
    until_metadata_calls_at_least(&client, 1).await;
    let err = handle.await.expect_err("expected unknown topic error");
    assert!(matches!(err, ProducerError::UnknownTopicOrPartitionError { .. }));
    assert!(client.produce_calls().is_empty());
}
