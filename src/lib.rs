//! # Storehouse
//!
//! Scoped, lifecycle-managed state stores for component-tree applications.
//!
//! Storehouse keeps every store of an application in one registry and gives
//! each a stable identity, so the same store can be found again across a
//! render tree, serialized on the server, and restored on the client.
//!
//! ## Registry
//!
//! - `Manager` - Creates, looks up, mounts and evicts stores
//! - `StoreType<S>` - Registration descriptor: name, static id, global and
//!   persistence flags, constructor
//! - Scope tree - Lookups walk from the requesting scope towards the root
//! - Lifecycle - Unused stores are evicted after configurable delays
//!
//! ## Persistence
//!
//! - `Storage` - Async backend trait, with `MemoryStorage` and
//!   `JsonFileStorage`
//! - `Manager::persist_store` - Flags a store type as persisted
//! - Default wakeup merges stored and bootstrap state into the store
//!
//! ## Streaming
//!
//! - `StreamStores` / `ManagerStream` - Emit store state next to completed
//!   suspense boundaries of a streamed HTML response
//! - `StateInbox` - Client-side receiver feeding the manager's init state

pub mod error;
pub mod events;
pub mod manager;
pub mod persist;
pub mod scope;
pub mod store;
pub mod stream;

// Re-export main types for convenience
pub use error::{Result, StoreError};
pub use events::{StoreEvent, StoreEventKind};
pub use manager::{
    DestroyTimers, Manager, ManagerOptions, ManagerParams, StoreMeta, WeakManager, ID_SEPARATOR,
};
pub use persist::{deep_merge, JsonFileStorage, MemoryStorage, Storage};
pub use scope::{create_scope_id, Lookup, Scope, ScopeTree, GLOBAL_SCOPE, ROOT_SCOPE};
pub use store::{
    Observable, ScopeParams, State, Store, StoreContext, StoreDef, StoreMap, StoreParams, StoreRef,
    StoreStatus, StoreType, Subscription, Teardown, WakeupState,
};
pub use stream::{ManagerStream, StateInbox, StreamStores};
