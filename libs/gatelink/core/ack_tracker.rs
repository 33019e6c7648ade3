//! Heartbeat acknowledgement tracking
//!
//! The gateway acknowledges every heartbeat. A connection whose heartbeats
//! stop being acknowledged is a zombie: the socket is open but nothing is
//! listening. Each generation owns one tracker; the read side records acks,
//! the write pump checks health before every heartbeat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tracks heartbeat acknowledgements for one connection
///
/// Timestamps are stored as milliseconds since the tracker's epoch, offset
/// by one so that zero means "never".
#[derive(Debug)]
pub struct AckTracker {
    epoch: Instant,
    last_heartbeat_ms: AtomicU64,
    last_ack_ms: AtomicU64,
    timeout: Duration,
}

impl AckTracker {
    /// `timeout` is how long an unacknowledged heartbeat is tolerated
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_heartbeat_ms: AtomicU64::new(0),
            last_ack_ms: AtomicU64::new(0),
            timeout,
        }
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    pub fn record_heartbeat_sent(&self) {
        self.last_heartbeat_ms.store(self.now_ms(), Ordering::Release);
    }

    pub fn record_ack(&self) {
        self.last_ack_ms.store(self.now_ms(), Ordering::Release);
    }

    /// False once a heartbeat has gone unacknowledged for longer than the timeout
    pub fn is_healthy(&self) -> bool {
        let sent = self.last_heartbeat_ms.load(Ordering::Acquire);
        let acked = self.last_ack_ms.load(Ordering::Acquire);

        if sent == 0 || acked >= sent {
            return true;
        }

        self.now_ms().saturating_sub(sent) < self.timeout.as_millis() as u64
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
