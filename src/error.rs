//! Error types for the store manager.

use thiserror::Error;

/// Errors produced by the registry, persistence and streaming layers.
///
/// Only [`StoreError::NotInitialized`] is meant to reach callers as a hard
/// failure. The remaining variants are logged by the manager and turned into
/// safe defaults.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The global accessor was used before a manager was installed.
    #[error("store manager is not initialized")]
    NotInitialized,

    /// A persisted store id was registered twice.
    #[error("duplicate persisted store id: {0}")]
    DuplicatePersistId(String),

    /// Several stores in one scope match a bare lookup.
    #[error("scope '{scope_id}' has multiple stores matching '{prefix}', pass a key to get_store")]
    AmbiguousStore {
        /// Scope in which the ambiguity was found.
        scope_id: String,
        /// Bare store name that was searched for.
        prefix: String,
    },

    /// A storage backend rejected a read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// A snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// File-backed storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store manager operations.
pub type Result<T> = std::result::Result<T, StoreError>;
