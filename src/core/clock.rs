// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Engine clock - wall-clock milliseconds driven by the tokio timer

use chrono::Utc;
use tokio::time::Instant;

/// Maps tokio instants onto epoch milliseconds.
///
/// The wall-clock anchor is sampled once; afterwards time advances with the
/// tokio clock so paused-time tests see consistent timestamps.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor_ms: i64,
    anchor: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    /// Clock whose current reading is `epoch_ms`
    pub fn starting_at(epoch_ms: i64) -> Self {
        Self {
            anchor_ms: epoch_ms,
            anchor: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.to_ms(Instant::now())
    }

    pub fn to_ms(&self, instant: Instant) -> i64 {
        if instant >= self.anchor {
            self.anchor_ms + instant.duration_since(self.anchor).as_millis() as i64
        } else {
            self.anchor_ms - self.anchor.duration_since(instant).as_millis() as i64
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = Clock::starting_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_ms(), 3_500);
    }
}
