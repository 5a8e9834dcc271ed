//! Object-store CLI driver.
//!
//! Every participating host talks to the intermediate cloud-drive store
//! through the `rclone` binary resident on that host; this crate builds
//! the command lines, runs them over a [`RemoteShell`], and parses the
//! tool's streamed progress output into `(percent, speed)` callbacks.
//! It also handles capability bootstrap: detecting the tool, installing
//! it (system-wide or user-local), and deploying the operator's local
//! rclone config to a host.
//!
//! [`RemoteShell`]: cloudferry_shell_pool::RemoteShell

mod conf;
mod driver;
mod progress;

pub use conf::{parse_conf, RemoteInfo};
pub use driver::{ProgressHandler, RcloneDriver, CONFIG_REMOTE_PATH};
pub use progress::ProgressParser;

use cloudferry_shell_pool::PoolError;

/// Errors produced by the driver.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("path contains a quote character: {0}")]
    UnquotablePath(String),

    #[error("{op} failed: {message}")]
    Command { op: String, message: String },

    #[error("tool install failed: {0}")]
    Install(String),

    #[error("config file unreadable: {0}")]
    Config(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-quotes a shell argument.
///
/// The contract is that arguments never contain the quote character;
/// anything else passes through verbatim inside the quotes.
pub(crate) fn quote(arg: &str) -> Result<String, DriveError> {
    if arg.contains('\'') {
        return Err(DriveError::UnquotablePath(arg.to_string()));
    }
    Ok(format!("'{arg}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_wraps_plain_paths() {
        assert_eq!(quote("/tmp/a b.zip").unwrap(), "'/tmp/a b.zip'");
    }

    #[test]
    fn quote_rejects_quote_char() {
        assert!(matches!(
            quote("/tmp/it's.zip"),
            Err(DriveError::UnquotablePath(_))
        ));
    }
}
