//! App lifecycle and connectivity events.
//!
//! The host (binary, UI shell, test) publishes; the query cache listens and
//! revalidates observed queries on `Foreground` and on `Online` after an
//! `Offline`.

use tokio::sync::broadcast;

use crate::constants::cache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
    Background,
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(cache::EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of listeners that received the event.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        log::debug!("[events] {event:?}");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}
