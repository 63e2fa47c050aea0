//! Persistence: storage backends, state merging and the default wakeup and
//! change tracking used by persisted stores.

mod merge;
mod storage;
mod wakeup;

pub use merge::deep_merge;
pub use storage::{JsonFileStorage, MemoryStorage, Storage};
pub use wakeup::{on_change_listener, wakeup};

pub(crate) use wakeup::restore_init_state;
