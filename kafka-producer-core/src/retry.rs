//! Retry back-off policy (spec §4.4). The exact growth curve beyond the pinned
//! first two attempts is implementation-defined (spec §9 Open Questions); this
//! implementation grows the wait by 1.1x per attempt after the first retry, which
//! satisfies both pinned data points exactly: attempt 2 waits `retry_interval`,
//! attempt 3 waits `retry_interval * 1.1`.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
    pub base_interval: Duration,
}

impl RetryPolicy {
    /// `attempt` is the attempt number that just failed (1-based, counting the
    /// first try). Returns whether another attempt is permitted under
    /// `max_req_attempts`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait to observe before making attempt number `next_attempt` (>= 2).
    pub fn interval_before_attempt(&self, next_attempt: u32) -> Duration {
        debug_assert!(next_attempt >= 2, "first attempt never waits");
        let growth = 1.1_f64.powi(next_attempt as i32 - 2);
        Duration::from_secs_f64(self.base_interval.as_secs_f64() * growth)
    }
}
