use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a registered store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreStatus {
    /// Created, never mounted and never handed to a child.
    Init,
    /// Handed to a child render before its owner mounted.
    Touched,
    /// Mounted by at least one owner.
    InUse,
    /// Every owner released it; eviction is pending.
    Unused,
}

impl StoreStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Init => "init",
            StoreStatus::Touched => "touched",
            StoreStatus::InUse => "in-use",
            StoreStatus::Unused => "unused",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
