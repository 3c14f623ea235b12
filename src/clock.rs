//! Wall-clock timestamps that advance with the `tokio` clock.
//!
//! Latencies and timeouts run on `tokio::time`, which can be paused. Each
//! timestamp is one wall-clock anchor plus the runtime time elapsed since,
//! so recorded durations always agree with the timers that produced them.

use jiff::{SignedDuration, Timestamp};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: Timestamp,
    runtime: Instant,
}

impl Clock {
    /// Anchor a clock at the current instant.
    pub fn start() -> Self {
        Self {
            wall: Timestamp::now(),
            runtime: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        SignedDuration::try_from(self.runtime.elapsed())
            .ok()
            .and_then(|elapsed| self.wall.checked_add(elapsed).ok())
            .unwrap_or(Timestamp::MAX)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_runtime_time() {
        let clock = Clock::start();
        let before = clock.now();

        tokio::time::sleep(Duration::from_secs(90)).await;

        let waited = clock.now().duration_since(before);
        assert!(waited >= SignedDuration::from_secs(90));
        assert!(waited < SignedDuration::from_secs(91));
    }

    #[test]
    fn never_runs_backwards() {
        let clock = Clock::start();
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
