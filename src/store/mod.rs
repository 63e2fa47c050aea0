//! Store types and the observable state surface.
//!
//! A store is any type implementing [`Store`]. It is registered through a
//! [`StoreType`] descriptor and keeps its serializable fields in [`State`]
//! cells, which the manager snapshots, restores and watches.

mod params;
mod state;
mod status;
mod store;

pub use params::{ScopeParams, StoreParams};
pub use state::{Observable, State, Subscription};
pub use status::StoreStatus;
pub(crate) use store::StoreClass;
pub use store::{
    Store, StoreContext, StoreDef, StoreMap, StoreRef, StoreType, Teardown, WakeupState,
};
