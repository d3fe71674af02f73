//! Dispatch & retry controller (spec §4.4). Each [`DispatchUnit`] (one partition
//! batch in batch mode, or a single submission in non-batch mode) is driven to a
//! terminal outcome by [`run_dispatch`], running as its own `tokio::spawn`ed task so
//! a slow or retrying partition never blocks the actor's mailbox or unrelated
//! topics (spec §5).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::Command;
use crate::client::{Acks, Client, ProduceRequest, ProduceResponse};
use crate::codec::{create_message_set, Codec};
use crate::demux::{demultiplex, DemuxOutcome};
use crate::error::ProducerError;
use crate::clock::Clock;
use crate::retry::RetryPolicy;
use crate::submission::QueuedSubmission;

/// One partition's worth of work handed from the batch aggregator (or the
/// non-batch submission path) to the dispatch controller.
#[derive(Debug)]
pub(crate) struct DispatchUnit {
    pub topic: Arc<str>,
    pub partition: i32,
    pub submissions: Vec<QueuedSubmission>,
}

impl DispatchUnit {
    fn encode(&self, codec: Codec) -> ProduceRequest {
        let messages: Vec<_> = self
            .submissions
            .iter()
            .flat_map(|s| s.messages.iter().cloned())
            .collect();
        ProduceRequest {
            topic: self.topic.clone(),
            partition: self.partition,
            message_set: create_message_set(&messages, codec),
        }
    }
}

type Outcome = (u64, Result<Option<ProduceResponse>, ProducerError>);

/// Drive `units` through the client until every submission they represent has a
/// terminal outcome, retrying transient failures up to `retry_policy.max_attempts`,
/// then report every outcome back to the actor mailbox as a single
/// [`Command::DispatchComplete`].
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_dispatch(
    mut units: Vec<DispatchUnit>,
    client: Arc<dyn Client>,
    acks: Acks,
    timeout: Duration,
    codec: Codec,
    retry_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    actor_tx: mpsc::Sender<Command>,
) {
    let mut outcomes: Vec<Outcome> = Vec::new();
    let mut attempt: u32 = 1;

    'attempts: while !units.is_empty() {
        if shutdown.is_cancelled() {
            cancel_all(&units, &mut outcomes);
            units.clear();
            break;
        }

        let requests: Vec<ProduceRequest> = units.iter().map(|u| u.encode(codec)).collect();
        metrics::counter!("kafka_producer_dispatch_attempts_total").increment(1);

        let reply = client.send_produce_request(requests, acks, timeout).await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_transient() && retry_policy.should_retry(attempt) {
                    metrics::counter!("kafka_producer_retries_total").increment(1);
                    if !wait_for_retry(&clock, &shutdown, &retry_policy, attempt).await {
                        cancel_all(&units, &mut outcomes);
                        break 'attempts;
                    }
                    attempt += 1;
                    continue 'attempts;
                }
                if !matches!(err, ProducerError::Unexpected(_)) {
                    tracing::warn!(error = %err, attempt, "dispatch attempt failed terminally");
                } else {
                    tracing::error!(error = %err, "unexpected failure in dispatch");
                }
                fail_all(&units, &err, &mut outcomes);
                break 'attempts;
            }
        };

        let mut retryable = Vec::new();
        for result in demultiplex(units, reply, acks) {
            match result {
                DemuxOutcome::Resolved(unit, outcome) => {
                    for submission in unit.submissions {
                        outcomes.push((submission.id, outcome.clone()));
                    }
                }
                DemuxOutcome::Retry(unit, err) => retryable.push((unit, err)),
            }
        }

        if retryable.is_empty() {
            units = Vec::new();
            break;
        }

        if retry_policy.should_retry(attempt) {
            metrics::counter!("kafka_producer_retries_total").increment(retryable.len() as u64);
            units = retryable.into_iter().map(|(unit, _)| unit).collect();
            if !wait_for_retry(&clock, &shutdown, &retry_policy, attempt).await {
                cancel_all(&units, &mut outcomes);
                break 'attempts;
            }
            attempt += 1;
        } else {
            for (unit, err) in retryable {
                for submission in unit.submissions {
                    outcomes.push((submission.id, Err(err.clone())));
                }
            }
            units = Vec::new();
        }
    }

    let _ = actor_tx.send(Command::DispatchComplete { outcomes }).await;
}

/// Sleep for the retry back-off, racing the shutdown token. Returns `false` if
/// shutdown won the race, in which case the caller should treat every remaining
/// submission as cancelled instead of retrying.
async fn wait_for_retry(
    clock: &Arc<dyn Clock>,
    shutdown: &CancellationToken,
    retry_policy: &RetryPolicy,
    attempt: u32,
) -> bool {
    let wait = retry_policy.interval_before_attempt(attempt + 1);
    tokio::select! {
        _ = clock.sleep(wait) => true,
        _ = shutdown.cancelled() => false,
    }
}

fn cancel_all(units: &[DispatchUnit], outcomes: &mut Vec<Outcome>) {
    for unit in units {
        for submission in &unit.submissions {
            outcomes.push((submission.id, Err(ProducerError::CancelledError)));
        }
    }
}

fn fail_all(units: &[DispatchUnit], err: &ProducerError, outcomes: &mut Vec<Outcome>) {
    for unit in units {
        for submission in &unit.submissions {
            outcomes.push((submission.id, Err(err.clone())));
        }
    }
}
