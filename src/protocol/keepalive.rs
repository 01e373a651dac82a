//! Keepalive and reconnect supervision.
//!
//! While a tunnel is up, [`supervise`] sends one connection state request
//! per keepalive interval. Consecutive unanswered requests are counted;
//! any answer or other inbound traffic resets the count. Once the count
//! reaches the configured limit the tunnel is considered stale, the
//! supervisor hands over to a reconnect task and exits.
//!
//! The reconnect task tears the old binding down and connects again,
//! sleeping a randomised, growing delay between failed attempts. Only a
//! gateway without free channels ends the loop.

use crate::config::TunnelConfig;
use crate::error::KnxError;
use crate::net::Transport;
use crate::protocol::async_tunnel::WeakConnection;
use core::future::Future;
use core::pin::Pin;
use core::time::Duration;
use rand::Rng;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Growth stops after this many doublings
const MAX_DOUBLINGS: u32 = 16;

/// Randomised exponential backoff between two bounds.
///
/// Attempt `n` waits `min * 2^n * r` with `r` drawn from `[1, 2)`, capped
/// at `max`. Every delay lies within `[min, max]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// Delays between `min` and `max`; a `max` below `min` is raised to it.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            attempt: 0,
        }
    }

    /// Bounds taken from the reconnect delays of `config`
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(config.reconnect_min_delay, config.reconnect_max_delay)
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(1.0..2.0);
        let growth = f64::from(1u32 << self.attempt.min(MAX_DOUBLINGS));
        self.attempt = self.attempt.saturating_add(1);

        Duration::try_from_secs_f64(self.min.as_secs_f64() * growth * jitter)
            .map_or(self.max, |delay| delay.clamp(self.min, self.max))
    }

    /// Start over from the minimum
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delays handed out since the last reset
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Keepalive cycle for one tunnel; exits when the tunnel closes, goes
/// stale, or the connection is dropped.
pub(crate) async fn supervise<T: Transport>(connection: WeakConnection<T>) {
    let Some((period, limit)) = connection
        .upgrade()
        .map(|c| (c.config().keepalive_interval, c.config().missed_alive_limit))
    else {
        return;
    };
    if period.is_zero() {
        knx_log!(warn, "keepalive interval is zero, supervision disabled");
        return;
    }

    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(connection) = connection.upgrade() else {
            return;
        };

        match connection.probe_alive().await {
            Ok(()) => knx_log!(trace, "keepalive answered"),
            Err(e) if e.is_not_connected() && !connection.is_connected() => {
                knx_log!(debug, "tunnel closed, keepalive stopped");
                return;
            }
            Err(e) => {
                let missed = connection.record_missed_alive();
                knx_log!(warn, "keepalive unanswered ({missed}/{limit}): {e}");
                if missed >= limit {
                    knx_log!(warn, "{}, reconnecting", KnxError::stale_connection());
                    connection.detach_keepalive();
                    connection.schedule_reconnect();
                    return;
                }
            }
        }
    }
}

/// Boxed so the connect, receive and reconnect futures do not form a
/// recursive type.
pub(crate) fn reconnect_task<T: Transport>(
    connection: WeakConnection<T>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(reconnect(connection))
}

async fn reconnect<T: Transport>(connection: WeakConnection<T>) {
    let mut backoff = {
        let Some(current) = connection.upgrade() else {
            return;
        };
        if current.is_bound() {
            if let Err(e) = current.release().await {
                knx_log!(debug, "teardown before reconnect: {e}");
            }
        }
        if !current.config().auto_reconnect {
            knx_log!(info, "auto reconnect disabled, staying disconnected");
            return;
        }
        Backoff::from_config(current.config())
    };

    loop {
        // no strong reference survives a sleep, so dropping the connection
        // ends the loop
        let result = {
            let Some(current) = connection.upgrade() else {
                return;
            };
            knx_log!(info, "reconnecting to {}", current.config().gateway);
            current.connect().await
        };

        match result {
            Ok(()) => {
                knx_log!(info, "reconnected after {} failed attempts", backoff.attempts());
                return;
            }
            Err(e) if e.is_no_connections_available() => {
                knx_log!(error, "gateway has no free channel, giving up: {e}");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                knx_log!(warn, "reconnect failed: {e}; next attempt in {delay:?}");
                time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_stays_within_bounds() {
        let min = Duration::from_secs(15);
        let max = Duration::from_secs(50);
        let mut backoff = Backoff::new(min, max);

        let first = backoff.next_delay();
        assert!(first >= min && first < min * 2);

        for _ in 0..40 {
            let delay = backoff.next_delay();
            assert!(delay >= min && delay <= max);
        }
        assert_eq!(backoff.attempts(), 41);
        assert_eq!(backoff.next_delay(), max);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.next_delay() < Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_inverted_bounds() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
