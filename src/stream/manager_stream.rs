use super::markers::{state_script, PREAMBLE};
use crate::manager::Manager;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-response emitter of suspense state, for renderers that report
/// boundary completion themselves.
#[derive(Debug)]
pub struct ManagerStream {
    manager: Manager,
    preamble_pushed: AtomicBool,
}

impl ManagerStream {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager,
            preamble_pushed: AtomicBool::new(false),
        }
    }

    /// Script with the state of the stores created under `suspense_id`.
    ///
    /// The first script of the response also carries the queue preamble.
    /// Returns `None` when no store belongs to the boundary.
    pub fn take(&self, suspense_id: &str) -> Option<String> {
        let store_ids = self.manager.suspense_store_ids(suspense_id);
        if store_ids.is_empty() {
            return None;
        }

        let script = state_script(&self.manager.to_json(Some(&store_ids)))?;
        if self.preamble_pushed.swap(true, Ordering::SeqCst) {
            Some(script)
        } else {
            Some(format!("{PREAMBLE}{script}"))
        }
    }
}
