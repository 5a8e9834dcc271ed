//! The session pool: keyed cache of live SSH sessions.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::listing::paginate;
use crate::session::SessionHandle;
use crate::shell::{ChunkHandler, DirPage, ExecOutput, HostDirectory, Page, RemoteShell};
use crate::PoolError;

/// Lifecycle notifications for pool observers.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    Connected { host_id: String },
    Disconnected { host_id: String },
    Error { host_id: String, message: String },
}

type Slot = Arc<tokio::sync::Mutex<Option<SessionHandle>>>;

/// Keyed cache of live SSH sessions.
///
/// `acquire` reuses an open session or dials; transport errors evict the
/// session so the next call redials. Concurrent callers for the same host
/// share one session and are serialized on it.
pub struct SshPool {
    directory: Arc<dyn HostDirectory>,
    slots: Mutex<HashMap<String, Slot>>,
    events_tx: mpsc::Sender<PoolEvent>,
    events_rx: tokio::sync::Mutex<Option<mpsc::Receiver<PoolEvent>>>,
}

impl SshPool {
    pub fn new(directory: Arc<dyn HostDirectory>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            directory,
            slots: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<PoolEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Closes and removes the session for a host, if any.
    pub async fn disconnect(&self, host_id: &str) {
        let slot = self.slot(host_id);
        let mut guard = slot.lock().await;
        if guard.take().is_some() {
            debug!(host = %host_id, "session disconnected");
            self.emit(PoolEvent::Disconnected {
                host_id: host_id.to_string(),
            });
        }
    }

    fn slot(&self, host_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(host_id.to_string()).or_default().clone()
    }

    fn emit(&self, event: PoolEvent) {
        // Observers are optional; never stall pool operations on them.
        let _ = self.events_tx.try_send(event);
    }

    /// Returns the live session for a host, dialing when needed.
    async fn acquire(&self, host_id: &str) -> Result<SessionHandle, PoolError> {
        let slot = self.slot(host_id);
        let mut guard = slot.lock().await;

        if let Some(handle) = guard.as_ref() {
            if handle.is_open() {
                return Ok(handle.clone());
            }
            // The session thread died since the last call.
            *guard = None;
            self.emit(PoolEvent::Disconnected {
                host_id: host_id.to_string(),
            });
        }

        let host = self
            .directory
            .host(host_id)
            .ok_or_else(|| PoolError::UnknownHost(host_id.to_string()))?;

        match SessionHandle::connect(&host).await {
            Ok(handle) => {
                info!(host = %host_id, "connected");
                *guard = Some(handle.clone());
                self.emit(PoolEvent::Connected {
                    host_id: host_id.to_string(),
                });
                Ok(handle)
            }
            Err(e) => {
                warn!(host = %host_id, error = %e, "connect failed");
                self.emit(PoolEvent::Error {
                    host_id: host_id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Drops the session after a transport failure and reports it.
    async fn evict(&self, host_id: &str, error: &PoolError) {
        if !error.is_transport() {
            return;
        }
        let slot = self.slot(host_id);
        let mut guard = slot.lock().await;
        if guard.take().is_some() {
            warn!(host = %host_id, error = %error, "session evicted");
            self.emit(PoolEvent::Error {
                host_id: host_id.to_string(),
                message: error.to_string(),
            });
            self.emit(PoolEvent::Disconnected {
                host_id: host_id.to_string(),
            });
        }
    }

    async fn run_exec(
        &self,
        host_id: String,
        command: String,
        on_chunk: Option<ChunkHandler>,
    ) -> Result<ExecOutput, PoolError> {
        let handle = self.acquire(&host_id).await?;

        let result = match on_chunk {
            None => handle.exec(command, None).await,
            Some(cb) => {
                let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
                let drain = async move {
                    while let Some(chunk) = chunk_rx.recv().await {
                        cb(&chunk);
                    }
                };
                let (result, ()) = tokio::join!(handle.exec(command, Some(chunk_tx)), drain);
                result
            }
        };

        if let Err(e) = &result {
            self.evict(&host_id, e).await;
        }
        result
    }
}

impl RemoteShell for SshPool {
    fn exec(
        &self,
        host_id: &str,
        command: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecOutput, PoolError>> + Send + '_>> {
        let host_id = host_id.to_string();
        let command = command.to_string();
        Box::pin(self.run_exec(host_id, command, None))
    }

    fn exec_streaming(
        &self,
        host_id: &str,
        command: &str,
        on_chunk: ChunkHandler,
    ) -> Pin<Box<dyn Future<Output = Result<ExecOutput, PoolError>> + Send + '_>> {
        let host_id = host_id.to_string();
        let command = command.to_string();
        Box::pin(self.run_exec(host_id, command, Some(on_chunk)))
    }

    fn put_file(
        &self,
        host_id: &str,
        local: &Path,
        remote: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PoolError>> + Send + '_>> {
        let host_id = host_id.to_string();
        let local = local.to_path_buf();
        let remote = remote.to_string();
        Box::pin(async move {
            let handle = self.acquire(&host_id).await?;
            let result = handle.put_file(local, remote).await;
            if let Err(e) = &result {
                self.evict(&host_id, e).await;
            }
            result
        })
    }

    fn get_file(
        &self,
        host_id: &str,
        remote: &str,
        local: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), PoolError>> + Send + '_>> {
        let host_id = host_id.to_string();
        let remote = remote.to_string();
        let local = local.to_path_buf();
        Box::pin(async move {
            let handle = self.acquire(&host_id).await?;
            let result = handle.get_file(remote, local).await;
            if let Err(e) = &result {
                self.evict(&host_id, e).await;
            }
            result
        })
    }

    fn list_dir(
        &self,
        host_id: &str,
        path: &str,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<DirPage, PoolError>> + Send + '_>> {
        let host_id = host_id.to_string();
        let path = path.to_string();
        Box::pin(async move {
            let handle = self.acquire(&host_id).await?;
            let result = handle.read_dir(path).await;
            match result {
                Ok(entries) => Ok(paginate(entries, page)),
                Err(e) => {
                    self.evict(&host_id, &e).await;
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudferry_protocol::Host;

    fn empty_pool() -> SshPool {
        let directory: Arc<dyn HostDirectory> = Arc::new(HashMap::<String, Host>::new());
        SshPool::new(directory)
    }

    #[tokio::test]
    async fn unknown_host_fails_without_dialing() {
        let pool = empty_pool();
        let result = pool.exec("nope", "true").await;
        assert!(matches!(result, Err(PoolError::UnknownHost(_))));
    }

    #[tokio::test]
    async fn take_events_once() {
        let pool = empty_pool();
        assert!(pool.take_events().await.is_some());
        assert!(pool.take_events().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_when_not_connected_is_noop() {
        let pool = empty_pool();
        pool.disconnect("nope").await;
    }

    #[tokio::test]
    async fn unknown_host_is_not_transport() {
        let err = PoolError::UnknownHost("x".into());
        assert!(!err.is_transport());
        assert!(PoolError::Closed.is_transport());
    }
}
