//! One live SSH session, owned by a dedicated blocking thread.
//!
//! libssh2 sessions are not `Sync`, and every operation on them blocks, so
//! each session lives on its own thread and processes commands from an
//! mpsc channel. Dropping the last [`SessionHandle`] (or any transport
//! error) ends the thread and closes the session.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use ssh2::Session;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use cloudferry_protocol::Host;

use crate::shell::{DirEntry, ExecOutput};
use crate::PoolError;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_POLL: Duration = Duration::from_millis(50);
const COPY_BUF_SIZE: usize = 256 * 1024;

pub(crate) enum SessionCmd {
    Exec {
        command: String,
        chunk_tx: Option<mpsc::UnboundedSender<String>>,
        reply: oneshot::Sender<Result<ExecOutput, PoolError>>,
    },
    PutFile {
        local: PathBuf,
        remote: String,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    GetFile {
        remote: String,
        local: PathBuf,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    ReadDir {
        path: String,
        reply: oneshot::Sender<Result<Vec<DirEntry>, PoolError>>,
    },
}

/// Cheap handle to a pooled session's command channel.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCmd>,
}

impl SessionHandle {
    /// Dials, authenticates and spawns the session thread.
    pub(crate) async fn connect(host: &Host) -> Result<Self, PoolError> {
        let host = host.clone();
        let host_id = host.id.clone();

        let session = tokio::task::spawn_blocking(move || dial(&host))
            .await
            .map_err(|_| PoolError::Closed)??;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCmd>(16);
        std::thread::Builder::new()
            .name(format!("ssh-{host_id}"))
            .spawn(move || {
                while let Some(cmd) = cmd_rx.blocking_recv() {
                    let fatal = serve(&session, cmd);
                    if fatal {
                        break;
                    }
                }
                let _ = session.disconnect(None, "pool close", None);
                debug!(host = %host_id, "session thread exited");
            })
            .map_err(PoolError::Io)?;

        Ok(Self { cmd_tx })
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub(crate) async fn exec(
        &self,
        command: String,
        chunk_tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ExecOutput, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCmd::Exec {
                command,
                chunk_tx,
                reply,
            })
            .await
            .map_err(|_| PoolError::Closed)?;
        rx.await.map_err(|_| PoolError::Closed)?
    }

    pub(crate) async fn put_file(&self, local: PathBuf, remote: String) -> Result<(), PoolError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCmd::PutFile {
                local,
                remote,
                reply,
            })
            .await
            .map_err(|_| PoolError::Closed)?;
        rx.await.map_err(|_| PoolError::Closed)?
    }

    pub(crate) async fn get_file(&self, remote: String, local: PathBuf) -> Result<(), PoolError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCmd::GetFile {
                remote,
                local,
                reply,
            })
            .await
            .map_err(|_| PoolError::Closed)?;
        rx.await.map_err(|_| PoolError::Closed)?
    }

    pub(crate) async fn read_dir(&self, path: String) -> Result<Vec<DirEntry>, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCmd::ReadDir { path, reply })
            .await
            .map_err(|_| PoolError::Closed)?;
        rx.await.map_err(|_| PoolError::Closed)?
    }
}

/// Dials and authenticates a session (blocking).
fn dial(host: &Host) -> Result<Session, PoolError> {
    let addr_str = host.dial_address();
    let connect = |reason: String| PoolError::Connect {
        host: host.id.clone(),
        reason,
    };

    let addr = addr_str
        .to_socket_addrs()
        .map_err(|e| connect(format!("resolve {addr_str}: {e}")))?
        .next()
        .ok_or_else(|| connect(format!("no address for {addr_str}")))?;

    let tcp = TcpStream::connect_timeout(&addr, DIAL_TIMEOUT)
        .map_err(|e| connect(format!("tcp {addr_str}: {e}")))?;

    let mut session = Session::new().map_err(|e| connect(format!("session init: {e}")))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| connect(format!("handshake: {e}")))?;

    if let Some(password) = &host.password {
        session
            .userauth_password(&host.username, password)
            .map_err(|e| connect(format!("password auth: {e}")))?;
    } else if let Some(key_path) = &host.key_path {
        session
            .userauth_pubkey_file(
                &host.username,
                None,
                std::path::Path::new(key_path),
                host.passphrase.as_deref(),
            )
            .map_err(|e| connect(format!("key auth: {e}")))?;
    } else {
        return Err(connect("no credentials configured".into()));
    }

    if !session.authenticated() {
        return Err(connect("authentication rejected".into()));
    }

    debug!(host = %host.id, addr = %addr_str, "session established");
    Ok(session)
}

/// Processes one command. Returns true when the session is unusable.
fn serve(session: &Session, cmd: SessionCmd) -> bool {
    match cmd {
        SessionCmd::Exec {
            command,
            chunk_tx,
            reply,
        } => {
            let result = run_command(session, &command, chunk_tx);
            let fatal = result.is_err();
            let _ = reply.send(result);
            fatal
        }
        SessionCmd::PutFile {
            local,
            remote,
            reply,
        } => {
            let result = sftp_put(session, &local, &remote);
            let fatal = result.is_err();
            let _ = reply.send(result);
            fatal
        }
        SessionCmd::GetFile {
            remote,
            local,
            reply,
        } => {
            let result = sftp_get(session, &remote, &local);
            let fatal = result.is_err();
            let _ = reply.send(result);
            fatal
        }
        SessionCmd::ReadDir { path, reply } => {
            let result = sftp_read_dir(session, &path);
            let fatal = result.is_err();
            let _ = reply.send(result);
            fatal
        }
    }
}

/// Runs a command on a fresh channel, optionally streaming chunks.
fn run_command(
    session: &Session,
    command: &str,
    chunk_tx: Option<mpsc::UnboundedSender<String>>,
) -> Result<ExecOutput, PoolError> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    let mut stdout = String::new();
    let mut stderr = String::new();

    match chunk_tx {
        None => {
            channel.read_to_string(&mut stdout)?;
            channel.stderr().read_to_string(&mut stderr)?;
        }
        Some(tx) => {
            // Alternate non-blocking reads over both streams so progress
            // chunks surface as they arrive instead of after EOF.
            session.set_blocking(false);
            let result = stream_channel(&mut channel, &tx, &mut stdout, &mut stderr);
            session.set_blocking(true);
            result?;
        }
    }

    channel.wait_close()?;
    let exit_code = channel.exit_status()?;

    Ok(ExecOutput {
        stdout: stdout.trim().to_string(),
        stderr: stderr.trim().to_string(),
        exit_code,
    })
}

fn stream_channel(
    channel: &mut ssh2::Channel,
    tx: &mpsc::UnboundedSender<String>,
    stdout: &mut String,
    stderr: &mut String,
) -> Result<(), PoolError> {
    let mut buf = [0u8; 8192];
    loop {
        let mut progressed = false;

        match channel.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                let _ = tx.send(text.clone());
                stdout.push_str(&text);
                progressed = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        match channel.stderr().read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                let _ = tx.send(text.clone());
                stderr.push_str(&text);
                progressed = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        if !progressed {
            if channel.eof() {
                break;
            }
            std::thread::sleep(STREAM_POLL);
        }
    }
    Ok(())
}

fn sftp_put(session: &Session, local: &std::path::Path, remote: &str) -> Result<(), PoolError> {
    let sftp = session.sftp()?;
    let mut src = std::fs::File::open(local)?;
    let mut dst = sftp.create(std::path::Path::new(remote))?;
    copy_stream(&mut src, &mut dst)?;
    Ok(())
}

fn sftp_get(session: &Session, remote: &str, local: &std::path::Path) -> Result<(), PoolError> {
    let sftp = session.sftp()?;
    let mut src = sftp.open(std::path::Path::new(remote))?;
    if let Some(parent) = local.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut dst = std::fs::File::create(local)?;
    copy_stream(&mut src, &mut dst)?;
    Ok(())
}

fn copy_stream<R: Read, W: std::io::Write>(src: &mut R, dst: &mut W) -> Result<(), PoolError> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
    }
    dst.flush()?;
    Ok(())
}

fn sftp_read_dir(session: &Session, path: &str) -> Result<Vec<DirEntry>, PoolError> {
    let sftp = session.sftp()?;
    let entries = sftp.readdir(std::path::Path::new(path))?;

    let mut result = Vec::with_capacity(entries.len());
    for (entry_path, stat) in entries {
        let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %entry_path.display(), "skipping unreadable entry name");
            continue;
        };
        result.push(DirEntry {
            name: name.to_string(),
            path: entry_path.to_string_lossy().into_owned(),
            is_dir: stat.is_dir(),
            size: stat.size.unwrap_or(0),
        });
    }
    Ok(result)
}
