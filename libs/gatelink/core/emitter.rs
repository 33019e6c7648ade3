//! Multicast of named events to subscribers

use crate::traits::{EventHandler, GatewayError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a subscription for [`Emitter::off`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Subscription {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
    once: bool,
}

/// Event registry shared by the client and its dispatch path
#[derive(Default)]
pub struct Emitter {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, handler: Arc<dyn EventHandler>, once: bool) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, handler, once });
        id
    }

    /// Call `handler` for every occurrence of its event
    pub fn on(&self, handler: impl EventHandler) -> HandlerId {
        self.subscribe(Arc::new(handler), false)
    }

    /// Call `handler` for the next occurrence only
    pub fn once(&self, handler: impl EventHandler) -> HandlerId {
        self.subscribe(Arc::new(handler), true)
    }

    /// Remove a subscription; false if it was already gone
    pub fn off(&self, id: HandlerId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver `data` to every subscriber of `event`
    ///
    /// Handlers run outside the registry lock, so they may subscribe or
    /// unsubscribe. Every handler runs even if an earlier one fails; the
    /// failures are joined into one `Dispatch` error.
    pub fn dispatch(&self, event: &str, data: &Value) -> Result<()> {
        let targets: Vec<Arc<dyn EventHandler>> = {
            let mut subscriptions = self.subscriptions.write();
            let targets = subscriptions
                .iter()
                .filter(|s| s.handler.event() == event)
                .map(|s| Arc::clone(&s.handler))
                .collect();
            subscriptions.retain(|s| !(s.once && s.handler.event() == event));
            targets
        };

        let failures: Vec<String> = targets
            .iter()
            .filter_map(|handler| handler.handle(data).err())
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Dispatch(format!(
                "{}: {}",
                event,
                failures.join("; ")
            )))
        }
    }
}
