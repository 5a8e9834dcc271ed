//! Keyed pool of live remote shell sessions.
//!
//! [`SshPool`] caches one SSH session per host id and exposes the
//! operations the rest of the pipeline needs: run a command to completion,
//! run it while streaming output chunks (for progress parsing), move files
//! over SFTP, and list a directory with pagination. Each pooled session is
//! owned by a dedicated blocking thread; callers talk to it over a command
//! channel, which serializes operations per session and keeps the
//! non-`Sync` libssh2 structures off the async runtime.
//!
//! Consumers depend on the [`RemoteShell`] trait, not on [`SshPool`], so
//! pipeline logic stays testable with in-memory fakes.

mod listing;
mod pool;
mod session;
mod shell;

pub use listing::{paginate, sort_entries};
pub use pool::{PoolEvent, SshPool};
pub use shell::{ChunkHandler, DirEntry, DirPage, ExecOutput, HostDirectory, Page, RemoteShell};

/// Errors produced by the session pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("connect to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("session closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),
}

impl PoolError {
    /// True when the underlying session is unusable and must be redialed.
    pub fn is_transport(&self) -> bool {
        !matches!(self, PoolError::UnknownHost(_))
    }
}
