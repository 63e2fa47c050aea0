//! Server-to-client state streaming.
//!
//! On the server, [`StreamStores`] (chunk interception) or [`ManagerStream`]
//! (explicit boundary completion) emits `window.mbxM.push(..)` scripts with
//! the state of stores created under completed suspense boundaries. On the
//! client, [`StateInbox`] feeds those payloads into the manager's init state.

mod inbox;
mod manager_stream;
mod markers;
mod synchronizer;

pub use inbox::StateInbox;
pub use manager_stream::ManagerStream;
pub use markers::{
    extract_payloads, state_script, suspense_child_scope, suspense_fallback_marker, PREAMBLE,
};
pub use synchronizer::StreamStores;
