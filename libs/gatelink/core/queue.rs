//! Pending message queue
//!
//! Outbound application messages wait here until the write pump of the
//! current generation picks them up. On reconnect the queue is forked: the
//! successor receives every message that was never handed to a pump, while
//! messages already polled stay with the pump that took them and are
//! resolved by it.

use crate::core::model::Payload;
use crate::traits::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::{oneshot, Notify};

/// An outbound payload and the channel its outcome is reported on
#[derive(Debug)]
pub struct PendingMessage {
    pub payload: Payload,
    result: oneshot::Sender<Result<()>>,
}

impl PendingMessage {
    /// Create a message and the receiver its sender waits on
    pub fn new(payload: Payload) -> (Self, oneshot::Receiver<Result<()>>) {
        let (result, rx) = oneshot::channel();
        (Self { payload, result }, rx)
    }

    /// Report the outcome to the sender; consumes the message
    pub fn resolve(self, outcome: Result<()>) {
        // the sender may have given up waiting
        let _ = self.result.send(outcome);
    }
}

#[derive(Debug, Default)]
struct QueueState {
    buffer: VecDeque<PendingMessage>,
    closed: bool,
}

/// FIFO of pending messages with a single consumer
#[derive(Debug, Default)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_messages(buffer: VecDeque<PendingMessage>) -> Self {
        let queue = Self {
            state: Mutex::new(QueueState {
                buffer,
                closed: false,
            }),
            available: Notify::new(),
        };
        if !queue.state.lock().buffer.is_empty() {
            queue.available.notify_one();
        }
        queue
    }

    /// Append to the tail; hands the message back if the queue is closed
    pub fn push(&self, message: PendingMessage) -> std::result::Result<(), PendingMessage> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(message);
            }
            state.buffer.push_back(message);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Take the head without waiting
    ///
    /// Returns `None` when the buffer is empty or the queue is closed.
    pub fn try_poll(&self) -> Option<PendingMessage> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.buffer.pop_front()
    }

    /// Wait for the next message; `None` once the queue is closed
    ///
    /// Cancel-safe: a message is only removed when the future completes.
    pub async fn poll(&self) -> Option<PendingMessage> {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(message) = state.buffer.pop_front() {
                    return Some(message);
                }
            }
            self.available.notified().await;
        }
    }

    /// New queue holding every message not yet handed out, in order
    ///
    /// The messages move to the successor, so the current consumer can no
    /// longer receive them.
    pub fn fork(&self) -> MessageQueue {
        let carried = std::mem::take(&mut self.state.lock().buffer);
        MessageQueue::with_messages(carried)
    }

    /// Stop accepting and yielding messages; wakes the consumer
    ///
    /// Buffered messages are left in place (see [`drain`](Self::drain)).
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_one();
    }

    /// Remove every buffered message, whether or not the queue is closed
    pub fn drain(&self) -> Vec<PendingMessage> {
        self.state.lock().buffer.drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
