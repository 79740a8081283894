//! Request pacing with optional jitter.
//!
//! The limiter ticks at a fixed interval derived from the configured requests
//! per second and optionally sleeps a random extra fraction of the interval
//! after each tick. Both suspension points honor cancellation.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Paces operations at a target rate, incorporating optional jitter.
///
/// Safe for concurrent callers: the underlying interval is shared, so the
/// combined rate across all callers stays at the configured RPS. A limiter
/// built with `rps <= 0` never blocks. The interval timer is released when
/// the limiter is dropped.
pub struct Limiter {
    interval: Duration,
    jitter: f64,
    ticker: Option<Mutex<Interval>>,
}

impl Limiter {
    /// Creates a new limiter with the given requests per second and jitter
    /// factor. Jitter is clamped to `[0.0, 1.0]`. If `rps <= 0`, waits return
    /// immediately.
    pub fn new(rps: f64, jitter: f64) -> Self {
        if rps <= 0.0 {
            return Limiter {
                interval: Duration::ZERO,
                jitter,
                ticker: None,
            };
        }

        let jitter = jitter.clamp(0.0, 1.0);
        let interval = Duration::from_secs_f64(1.0 / rps);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Limiter {
            interval,
            jitter,
            ticker: Some(Mutex::new(ticker)),
        }
    }

    /// Blocks until the next tick permits an operation, or until `cancel`
    /// fires, in which case `Error::Cancelled` is returned.
    ///
    /// With jitter configured, an extra sleep of up to `jitter * interval` is
    /// applied after the tick. A negative jitter draw collapses to zero: the
    /// ticker already enforces the minimum spacing, so negative draws just
    /// mean "go as soon as the tick fires".
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(ticker) = &self.ticker else {
            return Ok(());
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = async { ticker.lock().await.tick().await } => {}
        }

        if self.jitter > 0.0 {
            let draw: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
            if draw > 0.0 {
                let extra = self.interval.mul_f64(self.jitter * draw);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(extra) => {}
                }
            }
        }

        Ok(())
    }
}
