// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-delay send pacing.
//!
//! Sends go out serially with a fixed inter-message delay of
//! `1 / rate_per_second`. The first send is never delayed.

use std::time::Duration;

use sendero_core::SenderoError;
use tokio::time::Instant;

/// Paces a serial send loop to at most `rate_per_second` sends per second.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(rate_per_second: f64) -> Result<Self, SenderoError> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(SenderoError::Config(format!(
                "rate_per_second must be a positive number, got {rate_per_second}"
            )));
        }
        Ok(Self {
            interval: Duration::from_secs_f64(1.0 / rate_per_second),
            last: None,
        })
    }

    /// Wait until the next send slot. Returns immediately on the first call;
    /// every later call sleeps out the remainder of the fixed delay since
    /// the previous slot.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.interval).await;
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_and_nonfinite_rates() {
        assert!(Pacer::new(0.0).is_err());
        assert!(Pacer::new(-1.0).is_err());
        assert!(Pacer::new(f64::NAN).is_err());
        assert!(Pacer::new(f64::INFINITY).is_err());
        assert!(Pacer::new(0.5).is_ok());
    }

    #[tokio::test]
    async fn first_send_is_not_delayed() {
        let mut pacer = Pacer::new(1.0).unwrap();
        let start = std::time::Instant::now();
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn later_sends_honor_the_fixed_delay() {
        // 20/s => 50ms between sends; 3 slots span two gaps.
        let mut pacer = Pacer::new(20.0).unwrap();
        let start = std::time::Instant::now();
        for _ in 0..3 {
            pacer.pace().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
