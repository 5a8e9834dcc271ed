//! Source-side worker: file list, archive, stat, upload.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use cloudferry_drive::ProgressHandler;
use cloudferry_protocol::{LogLevel, PartStatus};
use cloudferry_shell_pool::ChunkHandler;

use crate::orchestrator::{JobCtx, JobMsg};
use crate::planner::Batch;
use crate::progress::{job_percent, PercentGate, PercentLatch};
use crate::TransferError;

/// Everything the packager needs for one part.
#[derive(Debug, Clone)]
pub(crate) struct PartPlan {
    pub part_id: String,
    /// 1-based part index.
    pub index: u32,
    /// Total parts in the job.
    pub total: usize,
    pub filename: String,
    pub batch: Batch,
    pub needs_split: bool,
}

/// An uploaded part handed to the dispatcher-driver.
#[derive(Debug, Clone)]
pub(crate) struct PartHandoff {
    pub part_id: String,
    pub index: u32,
    pub filename: String,
    pub store_path: String,
    pub needs_split: bool,
}

/// Serial packaging loop: one part at a time, in index order.
///
/// Any failure aborts the remaining parts and fails the job; dropping
/// the handoff sender lets the dispatcher-driver drain and exit.
pub(crate) async fn run(ctx: JobCtx, plans: Vec<PartPlan>, part_tx: mpsc::Sender<PartHandoff>) {
    for plan in plans {
        match package_and_upload(&ctx, &plan).await {
            Ok(handoff) => {
                ctx.log_part(
                    LogLevel::Info,
                    &plan.part_id,
                    format!("[Queue] Part {} ready for distribution", plan.index),
                );
                // Bounded handoff: blocks while the driver is behind.
                if part_tx.send(handoff).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                if !matches!(error, TransferError::Cancelled) {
                    ctx.log_part(
                        LogLevel::Error,
                        &plan.part_id,
                        format!("[Error] Part {} failed: {error}", plan.index),
                    );
                }
                ctx.send(JobMsg::SourceFailed { error });
                return;
            }
        }
    }
}

async fn package_and_upload(
    ctx: &JobCtx,
    plan: &PartPlan,
) -> Result<PartHandoff, TransferError> {
    ctx.pause_point().await?;

    let source = ctx.config.source_host_id.clone();
    let part_id = plan.part_id.clone();

    ctx.send(JobMsg::PartState {
        part_id: part_id.clone(),
        status: PartStatus::Packaging,
        percent: 0,
    });
    ctx.log_part(
        LogLevel::Info,
        &part_id,
        format!(
            "[Zip] Creating part {}/{} ({}, {} file(s))",
            plan.index,
            plan.total,
            plan.filename,
            plan.batch.files.len()
        ),
    );

    let staging = format!("/tmp/{}", plan.filename);
    let list_remote = format!("/tmp/{}.list", plan.filename);
    write_file_list(ctx, &source, &plan.batch, &part_id, &list_remote).await?;

    // Archive in "add files from list" mode, relative to the source folder.
    let zip_cmd = format!(
        "cd '{}' && zip -q -y '{}' -@ < '{}'",
        ctx.config.source_folder, staging, list_remote
    );
    let on_chunk: ChunkHandler = Arc::new(|chunk: &str| {
        debug!(target: "cloudferry::zip", "{}", chunk.trim_end());
    });
    let zipped = ctx
        .shell
        .exec_streaming(&source, &zip_cmd, on_chunk)
        .await
        .map_err(|e| TransferError::Package(e.to_string()))?;
    if !zipped.success() {
        let _ = ctx
            .shell
            .exec(&source, &format!("rm -f '{list_remote}'"))
            .await;
        return Err(TransferError::Package(output_error(
            &zipped.stdout,
            &zipped.stderr,
            zipped.exit_code,
        )));
    }

    let size = stat_size(ctx, &source, &staging).await?;

    let _ = ctx
        .shell
        .exec(&source, &format!("rm -f '{list_remote}'"))
        .await;

    let store_path = format!(
        "{}/{}",
        ctx.config.store_folder.trim_matches('/'),
        plan.filename
    );
    ctx.send(JobMsg::PartMeta {
        part_id: part_id.clone(),
        size,
        store_path: store_path.clone(),
    });

    ctx.pause_point().await?;
    ctx.send(JobMsg::PartState {
        part_id: part_id.clone(),
        status: PartStatus::Uploading,
        percent: 0,
    });

    upload_part(ctx, plan, &source, &staging, &store_path).await?;
    ctx.check_cancelled()?;

    ctx.send(JobMsg::PartUploaded {
        part_id: part_id.clone(),
    });
    ctx.log_part(
        LogLevel::Info,
        &part_id,
        format!(
            "[Upload] Part {}/{} uploaded ({size} bytes)",
            plan.index, plan.total
        ),
    );

    if ctx.config.delete_local_after_upload {
        let _ = ctx.shell.exec(&source, &format!("rm -f '{staging}'")).await;
        ctx.log_part(
            LogLevel::Info,
            &part_id,
            "[Cleanup] Removed local archive from source".into(),
        );
    }

    Ok(PartHandoff {
        part_id,
        index: plan.index,
        filename: plan.filename.clone(),
        store_path,
        needs_split: plan.needs_split,
    })
}

/// Renders the batch's relative paths and places them on the source.
async fn write_file_list(
    ctx: &JobCtx,
    source: &str,
    batch: &Batch,
    part_id: &str,
    list_remote: &str,
) -> Result<(), TransferError> {
    let mut contents = batch
        .files
        .iter()
        .map(|f| f.rel_path.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    contents.push('\n');

    let local = std::env::temp_dir().join(format!("cloudferry-{part_id}.list"));
    std::fs::write(&local, contents)
        .map_err(|e| TransferError::Package(format!("file list: {e}")))?;

    let put = ctx.shell.put_file(source, &local, list_remote).await;
    let _ = std::fs::remove_file(&local);
    put.map_err(|e| TransferError::Package(format!("file list upload: {e}")))
}

async fn stat_size(ctx: &JobCtx, source: &str, staging: &str) -> Result<u64, TransferError> {
    let stat = ctx
        .shell
        .exec(source, &format!("stat -c %s '{staging}'"))
        .await
        .map_err(|e| TransferError::Package(e.to_string()))?;
    if !stat.success() {
        return Err(TransferError::Package(format!(
            "stat of {staging} failed: {}",
            stat.stderr
        )));
    }
    stat.stdout
        .trim()
        .parse()
        .map_err(|_| TransferError::Package(format!("unreadable archive size: {}", stat.stdout)))
}

async fn upload_part(
    ctx: &JobCtx,
    plan: &PartPlan,
    source: &str,
    staging: &str,
    store_path: &str,
) -> Result<(), TransferError> {
    // Detailed per-part percentage on every change; log lines only at
    // 20% boundaries for split jobs, 10% for single-archive ones.
    let gate = PercentGate::new(if plan.needs_split { 20 } else { 10 });
    let latch = PercentLatch::new();
    let msg_tx = ctx.msg_tx.clone();
    let part_id = plan.part_id.clone();
    let index = plan.index;
    let total = plan.total;

    let on_progress: ProgressHandler = Arc::new(move |percent, speed| {
        if latch.advance(percent) {
            let _ = msg_tx.send(JobMsg::PartState {
                part_id: part_id.clone(),
                status: PartStatus::Uploading,
                percent,
            });
        }
        if gate.pass(percent) {
            let speed = speed.map(|s| format!(" ({s}/s)")).unwrap_or_default();
            let _ = msg_tx.send(JobMsg::Log {
                level: LogLevel::Info,
                message: format!(
                    "[Upload] Part {index}/{total}: {percent}%{speed} (job {}%)",
                    job_percent(index, total, percent)
                ),
                host_id: None,
                part_id: Some(part_id.clone()),
            });
        }
    });

    ctx.drive
        .upload_file(source, staging, &ctx.store_remote, store_path, on_progress)
        .await
        .map_err(|e| TransferError::Upload(e.to_string()))
}

fn output_error(stdout: &str, stderr: &str, exit_code: i32) -> String {
    if !stderr.is_empty() {
        stderr.to_string()
    } else if !stdout.is_empty() {
        stdout.to_string()
    } else {
        format!("exit code {exit_code}")
    }
}
