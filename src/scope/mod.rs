//! Scope tree: one scope per mounted subtree instance.
//!
//! Store identities are qualified by their scope, and lookups walk from a
//! scope towards the root until a single matching store is found.

mod tree;

pub use tree::{Lookup, Scope, ScopeTree};

/// Sentinel every parent chain terminates at.
pub const ROOT_SCOPE: &str = "root";

/// Scope that holds global stores.
pub const GLOBAL_SCOPE: &str = "global";

/// Normalise an arbitrary seed (for instance a UI framework id such as
/// `:R1a:`) into a scope id.
///
/// Only ASCII alphanumerics and `_` survive, so a scope id can never contain
/// the `--` identity separator.
pub fn create_scope_id(seed: &str) -> String {
    seed.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
