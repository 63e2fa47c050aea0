//! Lifecycle events published by the manager.
//!
//! Inspection tools subscribe with [`Manager::subscribe_events`](crate::Manager::subscribe_events).

use crate::store::StoreRef;

/// Capacity of the event channel. Slow receivers lag rather than block.
pub(crate) const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEventKind {
    Created,
    Mounted,
    Unmounted,
    Deleted,
}

/// A lifecycle transition of one store.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub store: StoreRef,
}

impl StoreEvent {
    pub fn store_id(&self) -> &str {
        self.store.id()
    }
}
