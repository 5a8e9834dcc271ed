//! Persistence for cloudferry: hosts, job snapshots, session state.
//!
//! [`DocumentStore`] is a small namespaced document store backed by one
//! JSON file with atomic writes. [`ServerCatalog`] layers credential
//! handling on top of it: host passwords and passphrases round-trip
//! through an [`EncryptionAdapter`] so plaintext never reaches disk, and
//! hosts referenced by an active job cannot be deleted.

mod catalog;
mod secrets;
mod store;

pub use catalog::ServerCatalog;
pub use secrets::{EncryptionAdapter, ReversibleEncoder};
pub use store::DocumentStore;

/// Errors produced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("host {0} is referenced by an active job")]
    HostInUse(String),

    #[error("not found: {0}")]
    NotFound(String),
}
