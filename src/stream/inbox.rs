use super::markers::extract_payloads;
use crate::manager::{Manager, WeakManager};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Default)]
struct InboxState {
    pending: Vec<Map<String, Value>>,
    manager: Option<WeakManager>,
}

/// Client-side receiver of streamed state.
///
/// Pushes that arrive before a manager exists are buffered and replayed on
/// [`StateInbox::attach`]; afterwards they go straight to
/// [`Manager::push_init_state`].
#[derive(Clone, Default)]
pub struct StateInbox {
    state: Arc<Mutex<InboxState>>,
}

impl StateInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payload: Map<String, Value>) {
        let manager = {
            let mut state = self.state.lock();
            match state.manager.as_ref().and_then(WeakManager::upgrade) {
                Some(manager) => manager,
                None => {
                    state.pending.push(payload);
                    return;
                }
            }
        };
        manager.push_init_state(payload);
    }

    /// Push every state payload found in an emitted HTML chunk. Returns how
    /// many were found.
    pub fn push_chunk(&self, html: &str) -> usize {
        let payloads = extract_payloads(html);
        let count = payloads.len();
        for payload in payloads {
            self.push(payload);
        }
        count
    }

    /// Route pushes to `manager`, replaying the buffered ones first.
    pub fn attach(&self, manager: &Manager) {
        let pending = {
            let mut state = self.state.lock();
            state.manager = Some(manager.downgrade());
            std::mem::take(&mut state.pending)
        };

        if !pending.is_empty() {
            tracing::debug!(payloads = pending.len(), "replaying buffered stream state");
        }
        for payload in pending {
            manager.push_init_state(payload);
        }
    }

    /// Number of payloads waiting for a manager.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl std::fmt::Debug for StateInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StateInbox")
            .field("pending", &state.pending.len())
            .field("attached", &state.manager.is_some())
            .finish()
    }
}
