//! Connection generations and session state
//!
//! A generation pairs one transport lifetime with one message queue. The
//! slot holds the current generation; it is replaced only by a
//! compare-and-swap keyed on the generation the caller last saw, so when
//! several tasks notice the same failure exactly one of them restarts.

use crate::core::ack_tracker::AckTracker;
use crate::core::queue::MessageQueue;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// One connection attempt's lifetime
///
/// Immutable after construction apart from the shutdown signal. A
/// generation without a transport exists while the supervisor is resolving,
/// dialing or handshaking; messages sent meanwhile wait in its queue.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    queue: Arc<MessageQueue>,
    connected: bool,
    shutdown: watch::Sender<bool>,
    heartbeat_now: Notify,
    acks: Option<AckTracker>,
}

impl Generation {
    /// A generation with a fresh, empty queue
    pub fn new(id: u64) -> Self {
        Self::build(id, Arc::new(MessageQueue::new()), false, None)
    }

    fn build(
        id: u64,
        queue: Arc<MessageQueue>,
        connected: bool,
        ack_timeout: Option<Duration>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            queue,
            connected,
            shutdown,
            heartbeat_now: Notify::new(),
            acks: ack_timeout.map(AckTracker::new),
        }
    }

    /// Successor whose queue holds everything this one never handed out
    pub fn fork(&self, id: u64) -> Self {
        Self::build(id, Arc::new(self.queue.fork()), false, None)
    }

    /// The same queue, now bound to a live transport
    pub fn attach(&self, id: u64, ack_timeout: Option<Duration>) -> Self {
        Self::build(id, Arc::clone(&self.queue), true, ack_timeout)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn acks(&self) -> Option<&AckTracker> {
        self.acks.as_ref()
    }

    /// Ask the write pump for an immediate heartbeat
    pub fn request_heartbeat(&self) {
        self.heartbeat_now.notify_one();
    }

    pub(crate) async fn heartbeat_requested(&self) {
        self.heartbeat_now.notified().await
    }

    /// Close the queue and tell this generation's pumps to stop
    pub fn close(&self) {
        self.queue.close();
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        // the sender lives as long as self, so this only returns on close
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Holder of the current generation
///
/// `None` is the closed sentinel: once taken, no swap can succeed again.
#[derive(Debug)]
pub struct GenerationSlot {
    current: RwLock<Option<Arc<Generation>>>,
}

impl GenerationSlot {
    pub fn new(initial: Arc<Generation>) -> Self {
        Self {
            current: RwLock::new(Some(initial)),
        }
    }

    /// Snapshot of the current generation
    pub fn load(&self) -> Option<Arc<Generation>> {
        self.current.read().clone()
    }

    /// Run `f` against the current generation while no swap can happen
    pub fn with_current<R>(&self, f: impl FnOnce(&Generation) -> R) -> Option<R> {
        self.current.read().as_deref().map(f)
    }

    /// Replace `expected` with `next`; false if `expected` is no longer current
    pub fn compare_and_swap(&self, expected: &Arc<Generation>, next: Arc<Generation>) -> bool {
        let mut current = self.current.write();
        match current.as_ref() {
            Some(gen) if Arc::ptr_eq(gen, expected) => {
                *current = Some(next);
                true
            }
            _ => false,
        }
    }

    /// Fork `expected` into a successor with id `id`, publish it and close `expected`
    ///
    /// Returns `None` if another task already superseded `expected` or the
    /// slot was closed; the caller must then do nothing.
    pub fn supersede(&self, expected: &Arc<Generation>, id: u64) -> Option<Arc<Generation>> {
        let mut current = self.current.write();
        match current.as_ref() {
            Some(gen) if Arc::ptr_eq(gen, expected) => {
                let next = Arc::new(expected.fork(id));
                expected.close();
                *current = Some(Arc::clone(&next));
                Some(next)
            }
            _ => None,
        }
    }

    /// Swap in the closed sentinel; returns what was current
    pub fn take(&self) -> Option<Arc<Generation>> {
        self.current.write().take()
    }

    /// Swap in the closed sentinel only if `expected` is still current
    pub fn take_if(&self, expected: &Arc<Generation>) -> bool {
        let mut current = self.current.write();
        match current.as_ref() {
            Some(gen) if Arc::ptr_eq(gen, expected) => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.current.read().is_none()
    }
}

/// State that survives reconnects
#[derive(Debug, Default)]
pub struct Session {
    id: RwLock<Option<Arc<str>>>,
    sequence: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<Arc<str>> {
        self.id.read().clone()
    }

    pub fn set_id(&self, id: impl Into<Arc<str>>) {
        *self.id.write() = Some(id.into());
    }

    /// Forget the session so the next handshake identifies anew
    pub fn clear_id(&self) {
        *self.id.write() = None;
    }

    /// Last observed dispatch sequence; `None` until one is seen
    pub fn sequence(&self) -> Option<u64> {
        match self.sequence.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    pub fn record_sequence(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::Release);
    }
}
