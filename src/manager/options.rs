use crate::error::Result;
use crate::store::StoreStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Manager configuration.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use storehouse::ManagerOptions;
///
/// let options = ManagerOptions::from_json(r#"{ "should_disable_persist": true }"#).unwrap();
/// assert!(options.should_disable_persist);
/// assert!(options.should_remove_init_state);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Skip change tracking writes, e.g. when rendering on a server.
    pub should_disable_persist: bool,
    /// Drop a store's init state once it has been mounted.
    pub should_remove_init_state: bool,
    pub destroy_timers: DestroyTimers,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            should_disable_persist: false,
            should_remove_init_state: true,
            destroy_timers: DestroyTimers::default(),
        }
    }
}

impl ManagerOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Eviction delays in milliseconds per lifecycle state. `None` disables
/// eviction from that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestroyTimers {
    pub init: Option<u64>,
    /// Should cover the slowest request a child render may wait on.
    pub touched: Option<u64>,
    pub unused: Option<u64>,
}

impl Default for DestroyTimers {
    fn default() -> Self {
        Self {
            init: Some(500),
            touched: Some(10_000),
            unused: Some(1_000),
        }
    }
}

impl DestroyTimers {
    /// Eviction delay for a store entering `status`.
    pub fn delay(&self, status: StoreStatus) -> Option<Duration> {
        let millis = match status {
            StoreStatus::Init => self.init,
            StoreStatus::Touched => self.touched,
            StoreStatus::Unused => self.unused,
            StoreStatus::InUse => None,
        };
        millis.map(Duration::from_millis)
    }

    /// Timers that never evict.
    pub fn disabled() -> Self {
        Self {
            init: None,
            touched: None,
            unused: None,
        }
    }
}
