//! The remote shell seam: the trait pipeline code is written against.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use cloudferry_protocol::Host;

use crate::PoolError;

/// Output of a remote command run to completion.
///
/// A non-zero exit status is not an error at this layer; callers inspect
/// `exit_code` and decide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Callback invoked with every stdout/stderr chunk of a streaming exec.
pub type ChunkHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Pagination window for [`RemoteShell::list_dir`].
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 200,
            offset: 0,
        }
    }
}

/// One page of a sorted directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirPage {
    pub entries: Vec<DirEntry>,
    /// Total entries after dot-filtering, before pagination.
    pub total: usize,
    pub has_more: bool,
}

/// Resolves host ids to connection records.
///
/// The server catalog implements this; tests use a plain map.
pub trait HostDirectory: Send + Sync {
    fn host(&self, id: &str) -> Option<Host>;
}

impl HostDirectory for std::collections::HashMap<String, Host> {
    fn host(&self, id: &str) -> Option<Host> {
        self.get(id).cloned()
    }
}

/// Abstract remote shell, keyed by host id.
///
/// The pool implements this over SSH; pipeline tests implement it with
/// in-memory fakes. All operations dial on demand: a failed or evicted
/// session is re-established by the next call.
pub trait RemoteShell: Send + Sync {
    /// Runs a command to completion and returns its trimmed outputs.
    fn exec(
        &self,
        host_id: &str,
        command: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecOutput, PoolError>> + Send + '_>>;

    /// Like [`exec`](Self::exec), but invokes `on_chunk` for every
    /// stdout/stderr chunk as it arrives.
    fn exec_streaming(
        &self,
        host_id: &str,
        command: &str,
        on_chunk: ChunkHandler,
    ) -> Pin<Box<dyn Future<Output = Result<ExecOutput, PoolError>> + Send + '_>>;

    /// Uploads a local file to a remote path over the file channel.
    fn put_file(
        &self,
        host_id: &str,
        local: &Path,
        remote: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PoolError>> + Send + '_>>;

    /// Downloads a remote file to a local path over the file channel.
    fn get_file(
        &self,
        host_id: &str,
        remote: &str,
        local: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), PoolError>> + Send + '_>>;

    /// Lists a directory page: dot-entries hidden, directories first,
    /// case-insensitive by name.
    fn list_dir(
        &self,
        host_id: &str,
        path: &str,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<DirPage, PoolError>> + Send + '_>>;
}
