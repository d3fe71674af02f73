//! Injectable time source (spec §5, §9 "Injectable clock"). Every timing concern in
//! this crate — batch-by-time, retry back-off, the aggregator's timer loop — routes
//! through this trait so tests can drive it deterministically instead of sleeping in
//! real time, the Rust-idiomatic replacement for the upstream's injected
//! `MemoryReactorClock`.

use std::collections::BinaryHeap;
use std::cmp::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

/// An opaque point in time, comparable only against other instants from the same
/// clock. Wraps a duration-since-start rather than [`std::time::Instant`] so a
/// virtual clock can produce them without any real elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockInstant(pub(crate) Duration);

impl ClockInstant {
    pub fn elapsed_since(&self, earlier: ClockInstant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> ClockInstant;
    async fn sleep(&self, duration: Duration);
}

/// Real-time clock backed by `tokio::time`.
#[derive(Debug, Default)]
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> ClockInstant {
        ClockInstant(self.start.elapsed())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct Waiter {
    wake_at: Duration,
    seq: u64,
    tx: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at && self.seq == other.seq
    }
}
impl Eq for Waiter {}
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse: BinaryHeap is a max-heap, we want the earliest wake_at on top.
        other
            .wake_at
            .cmp(&self.wake_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct VirtualClockState {
    now: Duration,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,
}

/// A clock advanced explicitly by tests rather than by real elapsed time.
#[derive(Debug)]
pub struct VirtualClock {
    state: Mutex<VirtualClockState>,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualClockState {
                now: Duration::ZERO,
                waiters: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Advance the clock by `duration`, waking every sleeper whose deadline has now
    /// passed, in deadline order.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect("virtual clock mutex poisoned");
        state.now += duration;
        let now = state.now;
        let mut woken = Vec::new();
        while let Some(top) = state.waiters.peek() {
            if top.wake_at > now {
                break;
            }
            woken.push(state.waiters.pop().expect("peeked waiter must pop"));
        }
        drop(state);
        for waiter in woken {
            let _ = waiter.tx.send(());
        }
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> ClockInstant {
        ClockInstant(self.state.lock().expect("virtual clock mutex poisoned").now)
    }

    async fn sleep(&self, duration: Duration) {
        let rx = {
            let mut state = self.state.lock().expect("virtual clock mutex poisoned");
            let wake_at = state.now + duration;
            let seq = state.next_seq;
            state.next_seq += 1;
            if duration.is_zero() {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(Waiter { wake_at, seq, tx });
                Some(rx)
            }
        };
        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }
}
