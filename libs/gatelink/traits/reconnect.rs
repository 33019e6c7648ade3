use rand::Rng;
use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// The supervisor asks the strategy for a delay after every disruption and
/// resets it once a handshake succeeds. Strategies are stateful: each call
/// to [`next_delay`](ReconnectionStrategy::next_delay) counts as one attempt.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&mut self) -> Option<Duration>;

    /// Reset the strategy state (called after successful connection)
    fn reset(&mut self);

    /// Number of delays handed out since the last reset
    fn attempts(&self) -> usize;
}

/// Exponential backoff reconnection strategy
///
/// The base interval grows by `multiplier` after each attempt, capped at
/// `max_interval`. Each returned delay is drawn uniformly from
/// `[base - rf * base, base + rf * base]` where `rf` is the randomization
/// factor, then capped at `max_interval` as well.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_attempts: Option<usize>,
    current_interval: Duration,
    attempts: usize,
}

impl ExponentialBackoff {
    /// Create a new deterministic exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_interval` - The delay before the first reconnect
    /// * `max_interval` - The maximum delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            initial_interval,
            max_interval,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_attempts,
            current_interval: initial_interval,
            attempts: 0,
        }
    }

    /// Set the growth factor applied after each attempt
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the jitter applied to each delay (0.0 = none, 1.0 = full)
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// The un-jittered interval the next attempt will be based on
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    fn randomize(&self, base: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return base;
        }
        let base_ms = base.as_millis() as f64;
        let delta = self.randomization_factor * base_ms;
        let low = (base_ms - delta).max(0.0);
        let high = base_ms + delta;
        let ms = rand::thread_rng().gen_range(low..=high);
        Duration::from_millis(ms as u64)
    }
}

impl Default for ExponentialBackoff {
    /// 500ms initial, factor 2, full jitter, 10s cap, unlimited attempts
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10), None)
            .with_randomization_factor(1.0)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return None;
        }

        let delay = self.randomize(self.current_interval).min(self.max_interval);

        let next_ms = self.current_interval.as_millis() as f64 * self.multiplier;
        let next_ms = next_ms.min(self.max_interval.as_millis() as f64);
        self.current_interval = Duration::from_millis(next_ms as u64);
        self.attempts += 1;

        Some(delay)
    }

    fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.attempts = 0;
    }

    fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
    attempts: usize,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    ///
    /// # Arguments
    /// * `delay` - The fixed delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            max_attempts,
            attempts: 0,
        }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Never reconnect strategy
///
/// The first disruption becomes a fatal `ReconnectionFailed` error.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}

    fn attempts(&self) -> usize {
        0
    }
}
