//! Destination-side workers: prepare, download, stage, extract.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use cloudferry_drive::ProgressHandler;
use cloudferry_protocol::{DestStatus, Destination, LogLevel, PartStatus};
use cloudferry_shell_pool::RemoteShell;

use crate::orchestrator::{JobCtx, JobMsg};
use crate::packager::PartHandoff;
use crate::progress::{PercentGate, PercentLatch};
use crate::TransferError;

/// A destination that survived preparation.
#[derive(Debug, Clone)]
pub(crate) struct PreparedDest {
    pub host_id: String,
    pub folder: String,
    /// Store remote this destination reads from.
    pub remote: String,
}

/// Tracks per-part completion across destinations so the store object is
/// deleted exactly once, by the last destination to finish, and only
/// when no destination failed the part.
struct PartCleanup {
    remaining: AtomicUsize,
    failed: AtomicBool,
}

impl PartCleanup {
    fn new(destinations: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(destinations),
            failed: AtomicBool::new(false),
        }
    }

    /// Records this destination as done. Returns true when the caller is
    /// the last one and every destination succeeded.
    fn finish(&self, ok: bool) -> bool {
        if !ok {
            self.failed.store(true, Ordering::SeqCst);
        }
        let last = self.remaining.fetch_sub(1, Ordering::SeqCst) == 1;
        last && !self.failed.load(Ordering::SeqCst)
    }
}

/// The dispatcher-driver: consumes uploaded parts in arrival order.
///
/// For each part, one task per prepared destination runs concurrently;
/// the driver waits for all of them before taking the next part.
pub(crate) async fn run(ctx: JobCtx, mut part_rx: mpsc::Receiver<PartHandoff>) {
    let prepared = prepare_all(&ctx).await;

    while let Some(handoff) = part_rx.recv().await {
        if ctx.check_cancelled().is_err() {
            break;
        }

        ctx.send(JobMsg::PartState {
            part_id: handoff.part_id.clone(),
            status: PartStatus::Distributing,
            percent: 0,
        });

        let part_id = handoff.part_id.clone();
        if prepared.is_empty() {
            ctx.send(JobMsg::PartSettled { part_id });
            continue;
        }

        let cleanup = Arc::new(PartCleanup::new(prepared.len()));
        let handoff = Arc::new(handoff);
        let mut tasks = Vec::with_capacity(prepared.len());
        for dest in prepared.iter().cloned() {
            tasks.push(tokio::spawn(dispatch_part(
                ctx.clone(),
                dest,
                handoff.clone(),
                cleanup.clone(),
            )));
        }
        for task in tasks {
            let _ = task.await;
        }

        ctx.send(JobMsg::PartSettled { part_id });
    }
}

/// Prepares every destination in parallel; failures are reported and the
/// destination is excluded from all part work.
async fn prepare_all(ctx: &JobCtx) -> Vec<PreparedDest> {
    let mut handles = Vec::new();
    for dest in ctx.config.destinations.clone() {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let host_id = dest.host_id.clone();
            match prepare(&ctx, &dest).await {
                Ok(prepared) => Some(prepared),
                Err(error) => {
                    ctx.send(JobMsg::DestPrepFailed {
                        host_id,
                        error: error.to_string(),
                    });
                    None
                }
            }
        }));
    }

    let mut prepared = Vec::new();
    for handle in handles {
        if let Ok(Some(dest)) = handle.await {
            prepared.push(dest);
        }
    }
    // Parallel prep finishes in arbitrary order; restore config order.
    prepared.sort_by_key(|p| {
        ctx.config
            .destinations
            .iter()
            .position(|d| d.host_id == p.host_id)
    });
    prepared
}

/// Once per destination: session, store tool, tool config.
async fn prepare(ctx: &JobCtx, dest: &Destination) -> Result<PreparedDest, TransferError> {
    ctx.pause_point().await?;
    let host = &dest.host_id;
    ctx.log_host(LogLevel::Info, host, "[Dest] Preparing destination".into());

    let probe = ctx
        .shell
        .exec(host, "echo connected")
        .await
        .map_err(|e| TransferError::Connect(e.to_string()))?;
    if !probe.success() {
        return Err(TransferError::Connect(format!(
            "destination shell probe failed: {}",
            probe.stderr
        )));
    }

    let installed = ctx
        .drive
        .check_installed(host)
        .await
        .map_err(|e| TransferError::Connect(e.to_string()))?;
    if !installed {
        ctx.log_host(
            LogLevel::Info,
            host,
            "[Dest] Store tool missing; installing".into(),
        );
        ctx.drive
            .install_on_host(host)
            .await
            .map_err(|e| TransferError::ToolInstall(e.to_string()))?;
    }

    ctx.drive
        .deploy_config(host)
        .await
        .map_err(|e| TransferError::ToolInstall(format!("config deploy: {e}")))?;

    let remote = ctx
        .dest_remotes
        .get(host)
        .cloned()
        .ok_or_else(|| TransferError::UnknownStoreConfig(dest.store_config_id.clone()))?;

    ctx.log_host(LogLevel::Info, host, "[Dest] Destination ready".into());
    Ok(PreparedDest {
        host_id: dest.host_id.clone(),
        folder: dest.folder.clone(),
        remote,
    })
}

/// One part on one destination: download, stage or extract, store
/// cleanup, completion. Errors touch only this destination's slot.
async fn dispatch_part(
    ctx: JobCtx,
    dest: PreparedDest,
    handoff: Arc<PartHandoff>,
    cleanup: Arc<PartCleanup>,
) {
    match stage_part(&ctx, &dest, &handoff).await {
        Ok(()) => {
            let last = cleanup.finish(true);
            if last && ctx.config.delete_from_store_after_all_dest_done {
                if let Err(e) = ctx
                    .drive
                    .delete_file(&dest.host_id, &dest.remote, &handoff.store_path)
                    .await
                {
                    let error = TransferError::StoreDelete(e.to_string());
                    fail_slot(&ctx, &dest, &handoff, &error);
                    return;
                }
                ctx.log_host(
                    LogLevel::Info,
                    &dest.host_id,
                    format!("[Cleanup] Removed {} from store", handoff.store_path),
                );
            }

            ctx.send(JobMsg::DestState {
                part_id: handoff.part_id.clone(),
                host_id: dest.host_id.clone(),
                status: DestStatus::Completed,
                percent: 100,
                error: None,
            });
            ctx.log_host(
                LogLevel::Info,
                &dest.host_id,
                format!("[Dest] Part {} completed", handoff.index),
            );
        }
        Err(TransferError::Cancelled) => {
            cleanup.finish(false);
        }
        Err(error) => {
            cleanup.finish(false);
            fail_slot(&ctx, &dest, &handoff, &error);
        }
    }
}

fn fail_slot(ctx: &JobCtx, dest: &PreparedDest, handoff: &PartHandoff, error: &TransferError) {
    ctx.send(JobMsg::DestState {
        part_id: handoff.part_id.clone(),
        host_id: dest.host_id.clone(),
        status: DestStatus::Failed,
        percent: 0,
        error: Some(error.to_string()),
    });
    ctx.log_host(
        LogLevel::Error,
        &dest.host_id,
        format!("[Error] Part {}: {error}", handoff.index),
    );
}

/// Download to `/tmp` and move or extract into the destination folder.
async fn stage_part(
    ctx: &JobCtx,
    dest: &PreparedDest,
    handoff: &PartHandoff,
) -> Result<(), TransferError> {
    ctx.pause_point().await?;

    let host = &dest.host_id;
    ctx.send(JobMsg::DestState {
        part_id: handoff.part_id.clone(),
        host_id: host.clone(),
        status: DestStatus::Downloading,
        percent: 0,
        error: None,
    });
    ctx.log_host(
        LogLevel::Info,
        host,
        format!("[Download] Part {} ({})", handoff.index, handoff.filename),
    );

    let staging = format!("/tmp/{}", handoff.filename);
    download(ctx, dest, handoff, &staging).await?;

    ctx.send(JobMsg::DestState {
        part_id: handoff.part_id.clone(),
        host_id: host.clone(),
        status: DestStatus::Downloading,
        percent: 100,
        error: None,
    });
    ctx.pause_point().await?;

    let extract_now = ctx.config.auto_extract && !handoff.needs_split;
    if extract_now {
        // Single archive: extract in place and drop the staging file.
        ctx.send(JobMsg::DestState {
            part_id: handoff.part_id.clone(),
            host_id: host.clone(),
            status: DestStatus::Extracting,
            percent: 100,
            error: None,
        });
        let cmd = format!(
            "mkdir -p '{0}' && unzip -o '{1}' -d '{0}' && rm -f '{1}'",
            dest.folder, staging
        );
        let output = ctx
            .shell
            .exec(host, &cmd)
            .await
            .map_err(|e| TransferError::Extract(e.to_string()))?;
        if !output.success() {
            return Err(TransferError::Extract(format!(
                "unzip of {} failed: {}",
                handoff.filename, output.stderr
            )));
        }
        ctx.log_host(
            LogLevel::Info,
            host,
            format!("[Extract] Part {} extracted to {}", handoff.index, dest.folder),
        );
    } else {
        // Split parts are useless alone; park the file next to its
        // siblings (also the no-extract path).
        ctx.send(JobMsg::DestState {
            part_id: handoff.part_id.clone(),
            host_id: host.clone(),
            status: DestStatus::Staging,
            percent: 100,
            error: None,
        });
        let target = format!("{}/{}", dest.folder.trim_end_matches('/'), handoff.filename);
        let cmd = format!("mkdir -p '{}' && mv -f '{}' '{}'", dest.folder, staging, target);
        let output = ctx
            .shell
            .exec(host, &cmd)
            .await
            .map_err(|e| TransferError::Download(e.to_string()))?;
        if !output.success() {
            return Err(TransferError::Download(format!(
                "staging move of {} failed: {}",
                handoff.filename, output.stderr
            )));
        }
        debug!(host = %host, file = %handoff.filename, "part staged");
    }

    Ok(())
}

async fn download(
    ctx: &JobCtx,
    dest: &PreparedDest,
    handoff: &PartHandoff,
    staging: &str,
) -> Result<(), TransferError> {
    let gate = PercentGate::new(20);
    let latch = PercentLatch::new();
    let msg_tx = ctx.msg_tx.clone();
    let part_id = handoff.part_id.clone();
    let host_id = dest.host_id.clone();
    let index = handoff.index;

    let on_progress: ProgressHandler = Arc::new(move |percent, speed| {
        if latch.advance(percent) {
            let _ = msg_tx.send(JobMsg::DestState {
                part_id: part_id.clone(),
                host_id: host_id.clone(),
                status: DestStatus::Downloading,
                percent,
                error: None,
            });
        }
        if gate.pass(percent) {
            let speed = speed.map(|s| format!(" ({s}/s)")).unwrap_or_default();
            let _ = msg_tx.send(JobMsg::Log {
                level: LogLevel::Info,
                message: format!("[Download] Part {index}: {percent}%{speed}"),
                host_id: Some(host_id.clone()),
                part_id: Some(part_id.clone()),
            });
        }
    });

    ctx.drive
        .download_file(
            &dest.host_id,
            &dest.remote,
            &handoff.store_path,
            staging,
            on_progress,
        )
        .await
        .map_err(|e| TransferError::Download(e.to_string()))
}

/// One extract over the whole part glob, then glob cleanup.
///
/// Runs only after every destination has staged every part.
pub(crate) async fn bulk_extract(
    shell: &Arc<dyn RemoteShell>,
    host_id: &str,
    folder: &str,
    glob: &str,
) -> Result<(), TransferError> {
    let extract = format!("cd '{folder}' && unzip -o '{glob}'");
    let output = shell
        .exec(host_id, &extract)
        .await
        .map_err(|e| TransferError::Extract(e.to_string()))?;
    if !output.success() {
        return Err(TransferError::Extract(format!(
            "bulk unzip failed: {}",
            if output.stderr.is_empty() {
                output.stdout.clone()
            } else {
                output.stderr.clone()
            }
        )));
    }

    // The glob is intentionally unquoted so the shell expands it.
    let cleanup = format!("cd '{folder}' && rm -f {glob}");
    let output = shell
        .exec(host_id, &cleanup)
        .await
        .map_err(|e| TransferError::Extract(e.to_string()))?;
    if !output.success() {
        return Err(TransferError::Extract(format!(
            "part cleanup failed: {}",
            output.stderr
        )));
    }
    Ok(())
}
