//! Submission API (spec §4.1): the only type callers touch directly.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::actor::{self, ActorHandle, Command};
use crate::client::{Client, ProduceResponse};
use crate::clock::{Clock, TokioClock};
use crate::config::ProducerConfig;
use crate::error::ProducerError;
use crate::partition::{Partitioner, RoundRobinPartitioner};

/// A one-shot completion handle bound to a single submission. Resolves with the
/// broker's response, `None` when acks were not required, or a terminal
/// [`ProducerError`] (including [`ProducerError::CancelledError`]).
pub struct SendHandle {
    id: u64,
    actor_tx: mpsc::Sender<Command>,
    rx: oneshot::Receiver<Result<Option<ProduceResponse>, ProducerError>>,
}

impl SendHandle {
    /// Request cancellation. If the submission is still queued, it is removed from
    /// its batch with no side effects. If it has already been dispatched, the wire
    /// request cannot be un-sent; the outcome is overridden to
    /// [`ProducerError::CancelledError`] once the reply arrives (spec §5).
    pub fn cancel(&self) {
        let _ = self.actor_tx.try_send(Command::Cancel { id: self.id });
    }
}

impl Future for SendHandle {
    type Output = Result<Option<ProduceResponse>, ProducerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The actor dropped our reply sender without resolving it (e.g. it was
            // torn down); treat that the same as a cancellation.
            Poll::Ready(Err(_)) => Poll::Ready(Err(ProducerError::CancelledError)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Resolves once `stop()` has fully drained the producer: every handle has been
/// resolved and the batch timer (if any) has confirmed it stopped.
pub struct StopHandle {
    rx: oneshot::Receiver<()>,
}

impl Future for StopHandle {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The producer coordination engine (spec §1). Cheap to clone: every clone shares
/// the same actor mailbox.
#[derive(Clone)]
pub struct Producer {
    actor_tx: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    config: Arc<ProducerConfig>,
    partitioner_name: &'static str,
}

impl Producer {
    pub fn builder(client: Arc<dyn Client>) -> ProducerBuilder {
        ProducerBuilder::new(client)
    }

    /// Submit `messages` for `topic`. Non-empty is required; an empty list fails
    /// the handle synchronously with a validation error without mutating any
    /// producer state (spec §3, invariant I4).
    pub fn send_messages(&self, topic: impl Into<Arc<str>>, messages: Vec<Bytes>) -> SendHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        let topic = topic.into();

        if messages.is_empty() {
            let _ = reply_tx.send(Err(ProducerError::Validation(
                "messages must be non-empty".to_string(),
            )));
        } else {
            let command = Command::Submit {
                id,
                topic,
                messages,
                reply: reply_tx,
            };
            // try_send keeps the public API synchronous; the mailbox is sized
            // generously (see actor::spawn) and a full mailbox under backpressure
            // is itself an unexpected-failure condition for this submission.
            if let Err(err) = self.actor_tx.try_send(command) {
                match err {
                    mpsc::error::TrySendError::Full(Command::Submit { reply, .. }) => {
                        let _ = reply.send(Err(ProducerError::Unexpected(
                            "producer mailbox is full".to_string(),
                        )));
                    }
                    mpsc::error::TrySendError::Closed(Command::Submit { reply, .. }) => {
                        let _ = reply.send(Err(ProducerError::ShuttingDown));
                    }
                    _ => unreachable!("try_send only returns the command we sent"),
                }
            }
        }

        SendHandle {
            id,
            actor_tx: self.actor_tx.clone(),
            rx: reply_rx,
        }
    }

    /// Idempotent: resolves once all trigger timers are stopped and all in-flight
    /// work is completed or cancelled, no matter how many times or from how many
    /// clones it is called.
    pub fn stop(&self) -> StopHandle {
        let (tx, rx) = oneshot::channel();
        if self.actor_tx.try_send(Command::Stop { reply: tx }).is_err() {
            // Mailbox already torn down: the producer is necessarily stopped.
            let (immediate_tx, immediate_rx) = oneshot::channel();
            let _ = immediate_tx.send(());
            return StopHandle { rx: immediate_rx };
        }
        StopHandle { rx }
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.config.batch_send {
            format!(
                "{}cnt/{}bytes/{}secs",
                self.config.batch_every_n, self.config.batch_every_b, self.config.batch_every_t_secs
            )
        } else {
            "Unbatched".to_string()
        };
        write!(
            f,
            "<Producer {}:{}:{}:{}>",
            self.partitioner_name, mode, self.config.req_acks, self.config.ack_timeout_ms
        )
    }
}

/// Builds a [`Producer`], validating configuration and wiring the injectable
/// partitioner and clock seams (spec §3 Configuration table, §9 design notes).
pub struct ProducerBuilder {
    client: Arc<dyn Client>,
    config: ProducerConfig,
    partitioner: Box<dyn Partitioner>,
    clock: Arc<dyn Clock>,
    health: Option<health::HealthHandle>,
}

impl ProducerBuilder {
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self {
            client,
            config: ProducerConfig::default(),
            partitioner: Box::new(RoundRobinPartitioner::default()),
            clock: Arc::new(TokioClock::new()),
            health: None,
        }
    }

    pub fn config(mut self, config: ProducerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wire liveness reporting for the batch-time timer task into a shared health
    /// registry (ambient addition, ungated by any spec Non-goal).
    pub fn health(mut self, handle: health::HealthHandle) -> Self {
        self.health = Some(handle);
        self
    }

    pub fn build(self) -> Result<Producer, ProducerError> {
        self.config.validate()?;
        let partitioner_name = self.partitioner.name();
        let config = Arc::new(self.config.clone());
        let ActorHandle { tx } = actor::spawn(
            self.client,
            self.config,
            self.partitioner,
            self.clock,
            self.health,
        );
        Ok(Producer {
            actor_tx: tx,
            next_id: Arc::new(AtomicU64::new(0)),
            config,
            partitioner_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_format_matches_batched_mode() {
        let producer = Producer {
            actor_tx: mpsc::channel(1).0,
            next_id: Arc::new(AtomicU64::new(0)),
            config: Arc::new(ProducerConfig {
                req_acks: 1,
                ack_timeout_ms: 5,
                batch_every_n: 10,
                batch_every_b: 32768,
                batch_every_t_secs: 30,
                ..ProducerConfig::default()
            }),
            partitioner_name: "RoundRobinPartitioner",
        };
        assert_eq!(
            producer.to_string(),
            "<Producer RoundRobinPartitioner:10cnt/32768bytes/30secs:1:5>"
        );
    }

    #[test]
    fn repr_format_matches_unbatched_mode() {
        let producer = Producer {
            actor_tx: mpsc::channel(1).0,
            next_id: Arc::new(AtomicU64::new(0)),
            config: Arc::new(ProducerConfig {
                req_acks: 1,
                ack_timeout_ms: 5,
                batch_send: false,
                ..ProducerConfig::default()
            }),
            partitioner_name: "RoundRobinPartitioner",
        };
        assert_eq!(
            producer.to_string(),
            "<Producer RoundRobinPartitioner:Unbatched:1:5>"
        );
    }
}
