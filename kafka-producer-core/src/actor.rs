//! The single task that owns every piece of mutable producer state: the batch
//! table, the pending-submission registry, the partitioner cursor, and the
//! shutdown state machine. Driven exclusively by [`Command`] messages arriving on
//! an mpsc mailbox (spec §5) — the Rust-idiomatic replacement for the upstream's
//! single-threaded reactor, grounded on the mailbox-loop pattern in
//! `common/lifecycle::Manager::run_monitor_loop`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::batch::BatchTable;
use crate::client::{Client, ProduceResponse};
use crate::clock::Clock;
use crate::config::ProducerConfig;
use crate::dispatch::{run_dispatch, DispatchUnit};
use crate::error::ProducerError;
use crate::partition::Partitioner;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownState;
use crate::submission::QueuedSubmission;

pub(crate) type SubmitReply = oneshot::Sender<Result<Option<ProduceResponse>, ProducerError>>;

pub(crate) enum Command {
    Submit {
        id: u64,
        topic: Arc<str>,
        messages: Vec<Bytes>,
        reply: SubmitReply,
    },
    Cancel {
        id: u64,
    },
    MetadataLoaded {
        topic: Arc<str>,
        result: Result<(), ProducerError>,
    },
    TimerTick,
    TimerStopped,
    DispatchComplete {
        outcomes: Vec<(u64, Result<Option<ProduceResponse>, ProducerError>)>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// A cloneable front door to the actor's mailbox, held by [`crate::producer::Producer`].
#[derive(Clone)]
pub(crate) struct ActorHandle {
    pub tx: mpsc::Sender<Command>,
}

pub(crate) struct Actor {
    client: Arc<dyn Client>,
    config: ProducerConfig,
    partitioner: Box<dyn Partitioner>,
    clock: Arc<dyn Clock>,
    shutdown_token: CancellationToken,
    health: Option<health::HealthHandle>,
    tx: mpsc::Sender<Command>,

    state: ShutdownState,
    batches: BatchTable,
    pending: HashMap<u64, SubmitReply>,
    cancelled_in_flight: HashSet<u64>,
    waiting_on_metadata: HashMap<Arc<str>, Vec<(u64, Vec<Bytes>)>>,
    metadata_inflight: HashSet<Arc<str>>,
    outstanding_dispatches: usize,
    timer_running: bool,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

/// Spawn the actor task (and its timer task, if batching is enabled) and return a
/// handle to its mailbox plus the shutdown token shared with dispatch tasks.
pub(crate) fn spawn(
    client: Arc<dyn Client>,
    config: ProducerConfig,
    partitioner: Box<dyn Partitioner>,
    clock: Arc<dyn Clock>,
    health: Option<health::HealthHandle>,
) -> ActorHandle {
    let (tx, rx) = mpsc::channel(1024);
    let shutdown_token = CancellationToken::new();

    if config.batch_send {
        tokio::spawn(run_timer(
            clock.clone(),
            config.batch_every_t(),
            tx.clone(),
            shutdown_token.clone(),
            health.clone(),
        ));
    }

    let timer_running = config.batch_send;
    let actor = Actor {
        client,
        config,
        partitioner,
        clock,
        shutdown_token,
        health,
        tx: tx.clone(),
        state: ShutdownState::default(),
        batches: BatchTable::new(),
        pending: HashMap::new(),
        cancelled_in_flight: HashSet::new(),
        waiting_on_metadata: HashMap::new(),
        metadata_inflight: HashSet::new(),
        outstanding_dispatches: 0,
        timer_running,
        stop_waiters: Vec::new(),
    };

    tokio::spawn(actor.run(rx));

    ActorHandle { tx }
}

/// Periodic tick driving the batch-by-time trigger. Panics or send failures inside
/// one tick are caught and logged (matching the upstream's `_send_timer_failed`
/// log-and-restart semantics, grounded on the `catch_unwind` pattern in
/// `feature-flags::rayon_dispatcher`); the producer must never be left without a
/// running timer while batching is enabled and the producer has not stopped.
async fn run_timer(
    clock: Arc<dyn Clock>,
    interval: std::time::Duration,
    tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    health: Option<health::HealthHandle>,
) {
    loop {
        tokio::select! {
            _ = clock.sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
        if let Some(handle) = &health {
            handle.report_healthy().await;
        }
        let sent = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| tx.try_send(Command::TimerTick)));
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "_send_timer_failed: could not deliver timer tick, restarting loop");
            }
            Err(_) => {
                tracing::warn!("_send_timer_failed: timer tick panicked, restarting loop");
            }
        }
        if shutdown.is_cancelled() {
            break;
        }
    }
    let _ = tx.send(Command::TimerStopped).await;
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
            if self.state.is_stopped() {
                break;
            }
        }
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit {
                id,
                topic,
                messages,
                reply,
            } => self.handle_submit(id, topic, messages, reply),
            Command::Cancel { id } => self.handle_cancel(id),
            Command::MetadataLoaded { topic, result } => self.handle_metadata_loaded(topic, result),
            Command::TimerTick => self.handle_timer_tick(),
            Command::TimerStopped => {
                self.timer_running = false;
                self.try_finalize();
            }
            Command::DispatchComplete { outcomes } => self.handle_dispatch_complete(outcomes),
            Command::Stop { reply } => self.handle_stop(reply),
        }
    }

    fn handle_submit(&mut self, id: u64, topic: Arc<str>, messages: Vec<Bytes>, reply: SubmitReply) {
        if messages.is_empty() {
            let _ = reply.send(Err(ProducerError::Validation(
                "messages must be non-empty".to_string(),
            )));
            return;
        }
        if !self.state.accepts_submissions() {
            let _ = reply.send(Err(ProducerError::ShuttingDown));
            return;
        }

        self.pending.insert(id, reply);

        match self.client.topic_partitions(&topic) {
            Some(partitions) if !partitions.is_empty() => {
                self.enqueue_resolved(topic, partitions, id, messages);
            }
            _ => {
                self.waiting_on_metadata
                    .entry(topic.clone())
                    .or_default()
                    .push((id, messages));
                if self.metadata_inflight.insert(topic.clone()) {
                    self.spawn_metadata_load(topic);
                }
            }
        }
    }

    fn enqueue_resolved(&mut self, topic: Arc<str>, partitions: Vec<i32>, id: u64, messages: Vec<Bytes>) {
        let partition = self.partitioner.partition(&topic, &partitions);

        if self.config.batch_send {
            let now = self.clock.now();
            let submission = QueuedSubmission { id, messages };
            let triggered = self
                .batches
                .push(topic.clone(), partition, submission, &self.config, now);
            if triggered {
                if let Some(batch) = self.batches.drain(&topic, partition) {
                    self.dispatch_units(vec![DispatchUnit {
                        topic: batch.topic,
                        partition: batch.partition,
                        submissions: batch.submissions,
                    }]);
                }
            }
        } else {
            self.dispatch_units(vec![DispatchUnit {
                topic,
                partition,
                submissions: vec![QueuedSubmission { id, messages }],
            }]);
        }
    }

    fn dispatch_units(&mut self, units: Vec<DispatchUnit>) {
        self.outstanding_dispatches += 1;

        let client = self.client.clone();
        let acks = self
            .config
            .acks()
            .expect("acks validated at producer construction");
        let timeout = self.config.ack_timeout();
        let codec = self
            .config
            .codec()
            .expect("codec validated at producer construction");
        let retry_policy = RetryPolicy {
            max_attempts: self.config.max_req_attempts,
            base_interval: self.config.retry_interval(),
        };
        let clock = self.clock.clone();
        let shutdown = self.shutdown_token.clone();
        let tx = self.tx.clone();

        tokio::spawn(run_dispatch(
            units,
            client,
            acks,
            timeout,
            codec,
            retry_policy,
            clock,
            shutdown,
            tx,
        ));
    }

    fn spawn_metadata_load(&self, topic: Arc<str>) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.load_metadata_for_topics(vec![topic.clone()]).await;
            let _ = tx.send(Command::MetadataLoaded { topic, result }).await;
        });
    }

    fn handle_cancel(&mut self, id: u64) {
        if let Some(submission) = self.batches.remove_submission(id) {
            self.resolve(submission.id, Err(ProducerError::CancelledError));
            self.try_finalize();
            return;
        }

        let mut found_in_metadata_wait = false;
        for waiters in self.waiting_on_metadata.values_mut() {
            if let Some(pos) = waiters.iter().position(|(wid, _)| *wid == id) {
                waiters.remove(pos);
                found_in_metadata_wait = true;
                break;
            }
        }
        if found_in_metadata_wait {
            self.resolve(id, Err(ProducerError::CancelledError));
            self.try_finalize();
            return;
        }

        // Already dispatched: can't un-send the wire request, so only mark it.
        // The demultiplexer overrides the outcome with CancelledError once the
        // dispatch task reports back (spec §5, "handle cancellation across the
        // dispatch boundary").
        if self.pending.contains_key(&id) {
            self.cancelled_in_flight.insert(id);
        }
    }

    fn handle_metadata_loaded(&mut self, topic: Arc<str>, result: Result<(), ProducerError>) {
        self.metadata_inflight.remove(&topic);
        let waiters = self.waiting_on_metadata.remove(&topic).unwrap_or_default();
        if waiters.is_empty() {
            return;
        }

        if let Err(err) = result {
            for (id, _) in waiters {
                self.resolve(id, Err(err.clone()));
            }
            self.try_finalize();
            return;
        }

        match self.client.topic_partitions(&topic) {
            Some(partitions) if !partitions.is_empty() => {
                for (id, messages) in waiters {
                    self.enqueue_resolved(topic.clone(), partitions.clone(), id, messages);
                }
            }
            _ => {
                let error_code = self.client.metadata_error_for_topic(&topic);
                let err = if error_code != 0 {
                    ProducerError::UnknownTopicOrPartitionError {
                        topic: topic.clone(),
                    }
                } else {
                    // Metadata load reported success and no per-topic error, yet the
                    // partition list is still absent: the broker gave us nothing to
                    // act on. Distinct from the known-cause case above (spec §4.2).
                    tracing::warn!(
                        topic = %topic,
                        "topic still absent from metadata after a successful load with no recorded error"
                    );
                    ProducerError::NoResponseError
                };
                for (id, _) in waiters {
                    self.resolve(id, Err(err.clone()));
                }
                self.try_finalize();
            }
        }
    }

    fn handle_timer_tick(&mut self) {
        let now = self.clock.now();
        for batch in self.batches.drain_aged(&self.config, now) {
            self.dispatch_units(vec![DispatchUnit {
                topic: batch.topic,
                partition: batch.partition,
                submissions: batch.submissions,
            }]);
        }
    }

    fn handle_dispatch_complete(&mut self, outcomes: Vec<(u64, Result<Option<ProduceResponse>, ProducerError>)>) {
        self.outstanding_dispatches = self.outstanding_dispatches.saturating_sub(1);
        for (id, outcome) in outcomes {
            let outcome = if self.cancelled_in_flight.remove(&id) {
                Err(ProducerError::CancelledError)
            } else {
                outcome
            };
            self.resolve(id, outcome);
        }
        self.try_finalize();
    }

    fn handle_stop(&mut self, reply: oneshot::Sender<()>) {
        self.stop_waiters.push(reply);

        if self.state.is_stopped() {
            self.resolve_stop_waiters();
            return;
        }

        self.state.begin_stopping();
        self.shutdown_token.cancel();

        for batch in self.batches.drain_all() {
            for submission in batch.submissions {
                self.resolve(submission.id, Err(ProducerError::CancelledError));
            }
        }
        for (_, waiters) in self.waiting_on_metadata.drain() {
            for (id, _) in waiters {
                self.resolve(id, Err(ProducerError::CancelledError));
            }
        }

        self.try_finalize();
    }

    fn resolve(&mut self, id: u64, outcome: Result<Option<ProduceResponse>, ProducerError>) {
        if let Some(reply) = self.pending.remove(&id) {
            let _ = reply.send(outcome);
        }
    }

    fn try_finalize(&mut self) {
        if self.state != ShutdownState::Stopping {
            return;
        }
        self.state
            .finalize_if_drained(self.pending.len(), !self.timer_running);
        if self.state.is_stopped() {
            self.resolve_stop_waiters();
        }
    }

    fn resolve_stop_waiters(&mut self) {
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
