//! The job loop: worker wiring, state application, cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cloudferry_drive::RcloneDriver;
use cloudferry_protocol::{
    ArchiveName, ArchiveStoreConfig, DestStatus, Job, JobConfig, JobStatus, LogEntry, LogLevel,
    Part, PartStatus, TransferEvent,
};
use cloudferry_shell_pool::RemoteShell;
use cloudferry_store::DocumentStore;

use crate::dispatcher;
use crate::packager::{self, PartHandoff, PartPlan};
use crate::planner;
use crate::{EventBus, TransferError};

const PAUSE_POLL: Duration = Duration::from_secs(1);
const SETUP_STEPS: u32 = 3;

/// Pause/cancel surface for one job execution.
///
/// `cancel` is non-blocking: it flips the token, the orchestrator kills
/// in-flight remote processes, and workers exit at their next chunk
/// boundary. `pause` is cooperative: workers sleep-poll at boundaries
/// until resumed.
#[derive(Clone)]
pub struct JobController {
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController {
    pub fn new() -> Self {
        let (pause_tx, pause_rx) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            pause_tx,
            pause_rx,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
    }

    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_rx.borrow()
    }
}

/// State-change reports from workers to the orchestrator task.
///
/// Workers never touch the job record; every mutation flows through one
/// of these and is applied by the single owner.
pub(crate) enum JobMsg {
    PartState {
        part_id: String,
        status: PartStatus,
        percent: u8,
    },
    /// Size and store path become known during packaging.
    PartMeta {
        part_id: String,
        size: u64,
        store_path: String,
    },
    /// Upload finished; the part is visible to dispatchers.
    PartUploaded { part_id: String },
    /// Every destination task for the part has finished.
    PartSettled { part_id: String },
    DestState {
        part_id: String,
        host_id: String,
        status: DestStatus,
        percent: u8,
        error: Option<String>,
    },
    /// Destination preparation failed: every slot of that host fails.
    DestPrepFailed { host_id: String, error: String },
    /// The source-side pipeline aborted; the job fails.
    SourceFailed { error: TransferError },
    Log {
        level: LogLevel,
        message: String,
        host_id: Option<String>,
        part_id: Option<String>,
    },
}

/// Shared worker context: dependencies, flags, and the report channel.
#[derive(Clone)]
pub(crate) struct JobCtx {
    pub shell: Arc<dyn RemoteShell>,
    pub drive: Arc<RcloneDriver>,
    pub config: JobConfig,
    /// Store remote used for uploads.
    pub store_remote: String,
    /// Store remote per destination host.
    pub dest_remotes: HashMap<String, String>,
    pub cancel: CancellationToken,
    pub pause_rx: watch::Receiver<bool>,
    pub msg_tx: mpsc::UnboundedSender<JobMsg>,
}

impl JobCtx {
    pub fn send(&self, msg: JobMsg) {
        let _ = self.msg_tx.send(msg);
    }

    pub fn log_part(&self, level: LogLevel, part_id: &str, message: String) {
        self.send(JobMsg::Log {
            level,
            message,
            host_id: None,
            part_id: Some(part_id.to_string()),
        });
    }

    pub fn log_host(&self, level: LogLevel, host_id: &str, message: String) {
        self.send(JobMsg::Log {
            level,
            message,
            host_id: Some(host_id.to_string()),
            part_id: None,
        });
    }

    pub fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Chunk-boundary suspension point: honors cancel, then blocks in a
    /// short sleep loop while paused. No new remote process starts while
    /// paused.
    pub async fn pause_point(&self) -> Result<(), TransferError> {
        loop {
            self.check_cancelled()?;
            if !*self.pause_rx.borrow() {
                return Ok(());
            }
            tokio::time::sleep(PAUSE_POLL).await;
        }
    }
}

/// Drives one job from `Idle` to a terminal state.
pub struct Orchestrator {
    shell: Arc<dyn RemoteShell>,
    drive: Arc<RcloneDriver>,
    store: Arc<DocumentStore>,
    bus: EventBus,
    configs: HashMap<String, ArchiveStoreConfig>,
    controller: JobController,
}

impl Orchestrator {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        drive: Arc<RcloneDriver>,
        store: Arc<DocumentStore>,
        bus: EventBus,
        store_configs: Vec<ArchiveStoreConfig>,
    ) -> Self {
        Self {
            shell,
            drive,
            store,
            bus,
            configs: store_configs
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            controller: JobController::new(),
        }
    }

    /// Returns the pause/cancel surface for this execution.
    pub fn controller(&self) -> JobController {
        self.controller.clone()
    }

    /// Runs the job to a terminal state and returns the final snapshot.
    pub async fn run(&self, mut job: Job) -> Job {
        let job_id = job.config.id.clone();

        if let Err(msg) = job.config.validate() {
            return self.fail_job(job, TransferError::Plan(msg)).await;
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.error = None;
        self.persist(&job);
        self.bus.publish(TransferEvent::JobStarted {
            job_id: job_id.clone(),
            name: job.config.name.clone(),
        });
        info!(job = %job_id, name = %job.config.name, "job started");

        let (plan, archive) = match self.setup(&mut job).await {
            Ok(ready) => ready,
            Err(e) => return self.fail_job(job, e).await,
        };

        let plans: Vec<PartPlan> = job
            .parts
            .iter()
            .zip(plan.batches.iter())
            .map(|(part, batch)| PartPlan {
                part_id: part.id.clone(),
                index: part.index,
                total: job.parts.len(),
                filename: part.filename.clone(),
                batch: batch.clone(),
                needs_split: plan.needs_split,
            })
            .collect();

        let (source_failure, cancelled) = self.execute(&mut job, plans).await;
        self.finalize(job, &archive, plan.needs_split, source_failure, cancelled)
            .await
    }

    /// Re-runs a single failed part: packaging, upload and dispatch.
    ///
    /// The part and its destination slots are reset to pending and the
    /// retry counter is incremented; other parts are untouched.
    pub async fn retry(&self, mut job: Job, part_id: &str) -> Job {
        let job_id = job.config.id.clone();

        let Some(part) = job.part_mut(part_id) else {
            warn!(job = %job_id, part = %part_id, "retry: no such part");
            return job;
        };
        part.reset_for_retry();
        let index = part.index;
        let filename = part.filename.clone();
        let retry_count = part.retry_count;

        job.status = JobStatus::Running;
        job.error = None;
        job.finished_at = None;
        self.persist(&job);
        self.emit_log(
            LogLevel::Info,
            &job.config.id,
            format!("[Queue] Retrying part {index} (attempt {})", retry_count + 1),
            None,
            Some(part_id.to_string()),
        );

        // Re-derive the batch for this part from a fresh inventory; the
        // archive base name is preserved via the existing filename.
        let plan = match planner::plan(
            &self.shell,
            &job.config.source_host_id,
            &job.config.source_folder,
            job.config.part_size_bytes(),
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) => return self.fail_job(job, e).await,
        };

        let Some(batch) = plan.batches.get(index as usize - 1).cloned() else {
            return self
                .fail_job(
                    job,
                    TransferError::Plan(format!("batch {index} no longer exists on the source")),
                )
                .await;
        };

        let total = job.parts.len();
        let plans = vec![PartPlan {
            part_id: part_id.to_string(),
            index,
            total,
            filename: filename.clone(),
            batch,
            needs_split: plan.needs_split,
        }];

        let archive = archive_name_of(&filename);
        let (source_failure, cancelled) = self.execute(&mut job, plans).await;
        self.finalize(job, &archive, plan.needs_split, source_failure, cancelled)
            .await
    }

    // ------------------------------------------------------------------
    // setup
    // ------------------------------------------------------------------

    /// Serial source-side setup. Any failure here fails the job.
    async fn setup(&self, job: &mut Job) -> Result<(planner::Plan, ArchiveName), TransferError> {
        let config = job.config.clone();
        let job_id = config.id.clone();

        // Step 1: source session + store tool.
        self.advance_step(&job_id, 1, "Connecting to source host");
        let probe = self
            .shell
            .exec(&config.source_host_id, "echo connected")
            .await
            .map_err(|e| TransferError::Connect(e.to_string()))?;
        if !probe.success() {
            return Err(TransferError::Connect(format!(
                "source shell probe failed: {}",
                probe.stderr
            )));
        }

        let installed = self
            .drive
            .check_installed(&config.source_host_id)
            .await
            .map_err(|e| TransferError::Connect(e.to_string()))?;
        if !installed {
            self.emit_log(
                LogLevel::Info,
                &job_id,
                "[Step 1/3] Store tool missing on source; installing".into(),
                Some(config.source_host_id.clone()),
                None,
            );
            self.drive
                .install_on_host(&config.source_host_id)
                .await
                .map_err(|e| TransferError::ToolInstall(e.to_string()))?;
        }

        // Step 2: inventory and batching.
        self.advance_step(&job_id, 2, "Planning archive parts");
        let plan = planner::plan(
            &self.shell,
            &config.source_host_id,
            &config.source_folder,
            config.part_size_bytes(),
        )
        .await?;

        // Fresh parts for this run, one per batch, sharing a base name.
        let archive = ArchiveName::now();
        let dest_ids: Vec<String> = config
            .destinations
            .iter()
            .map(|d| d.host_id.clone())
            .collect();
        job.parts = (1..=plan.batches.len() as u32)
            .map(|i| Part::new(i, archive.filename(i, plan.needs_split), &dest_ids))
            .collect();
        self.persist(job);

        // Step 3: hand over to the concurrent pipeline.
        self.advance_step(
            &job_id,
            3,
            &format!(
                "Transferring {} part(s) to {} destination(s)",
                job.parts.len(),
                config.destinations.len()
            ),
        );
        Ok((plan, archive))
    }

    fn advance_step(&self, job_id: &str, step: u32, message: &str) {
        self.bus.publish(TransferEvent::JobStepAdvanced {
            job_id: job_id.to_string(),
            step,
            total_steps: SETUP_STEPS,
            message: message.to_string(),
        });
        self.emit_log(
            LogLevel::Info,
            job_id,
            format!("[Step {step}/{SETUP_STEPS}] {message}"),
            None,
            None,
        );
    }

    // ------------------------------------------------------------------
    // concurrent phase
    // ------------------------------------------------------------------

    /// Resolves the store remote for uploads and per destination.
    fn resolve_remotes(
        &self,
        config: &JobConfig,
    ) -> Result<(String, HashMap<String, String>), TransferError> {
        let mut dest_remotes = HashMap::new();
        for dest in &config.destinations {
            let remote = self
                .configs
                .get(&dest.store_config_id)
                .map(|c| c.remote_name.clone())
                .ok_or_else(|| TransferError::UnknownStoreConfig(dest.store_config_id.clone()))?;
            dest_remotes.insert(dest.host_id.clone(), remote);
        }
        // Uploads ride the first destination's store binding; a job uses
        // one configured cloud drive.
        let upload_remote = config
            .destinations
            .first()
            .and_then(|d| dest_remotes.get(&d.host_id))
            .cloned()
            .ok_or_else(|| TransferError::Plan("job has no destinations".into()))?;
        Ok((upload_remote, dest_remotes))
    }

    /// Spawns the packager and dispatcher-driver, then applies their
    /// reports until both finish.
    async fn execute(
        &self,
        job: &mut Job,
        plans: Vec<PartPlan>,
    ) -> (Option<TransferError>, bool) {
        let (store_remote, dest_remotes) = match self.resolve_remotes(&job.config) {
            Ok(resolved) => resolved,
            Err(e) => return (Some(e), false),
        };

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let (part_tx, part_rx) = mpsc::channel::<PartHandoff>(1);

        let ctx = JobCtx {
            shell: self.shell.clone(),
            drive: self.drive.clone(),
            config: job.config.clone(),
            store_remote,
            dest_remotes,
            cancel: self.controller.cancel.clone(),
            pause_rx: self.controller.pause_rx.clone(),
            msg_tx,
        };

        let packager = tokio::spawn(packager::run(ctx.clone(), plans, part_tx));
        let driver = tokio::spawn(dispatcher::run(ctx, part_rx));

        let mut source_failure: Option<TransferError> = None;
        let mut kill_issued = false;
        let mut kill_tasks = Vec::new();
        let mut pause_watch = self.controller.pause_rx.clone();

        loop {
            tokio::select! {
                biased;
                _ = self.controller.cancel.cancelled(), if !kill_issued => {
                    kill_issued = true;
                    job.status = JobStatus::Cancelling;
                    self.persist(job);
                    self.emit_log(
                        LogLevel::Warn,
                        &job.config.id,
                        "[Error] Cancel requested; killing remote processes".into(),
                        None,
                        None,
                    );
                    kill_tasks = self.kill_remote_processes(&job.config);
                }
                changed = pause_watch.changed() => {
                    if changed.is_ok() {
                        let paused = *pause_watch.borrow();
                        if paused && job.status == JobStatus::Running {
                            job.status = JobStatus::Paused;
                            self.persist(job);
                            self.emit_log(
                                LogLevel::Info,
                                &job.config.id,
                                "[Queue] Job paused".into(),
                                None,
                                None,
                            );
                        } else if !paused && job.status == JobStatus::Paused {
                            job.status = JobStatus::Running;
                            self.persist(job);
                            self.emit_log(
                                LogLevel::Info,
                                &job.config.id,
                                "[Queue] Job resumed".into(),
                                None,
                                None,
                            );
                        }
                    }
                }
                msg = msg_rx.recv() => match msg {
                    Some(msg) => self.apply(job, msg, &mut source_failure),
                    None => break,
                }
            }
        }

        let _ = packager.await;
        let _ = driver.await;
        for task in kill_tasks {
            let _ = task.await;
        }

        (source_failure, self.controller.cancel.is_cancelled())
    }

    /// Best-effort kill of archive/transfer/extract processes, issued
    /// from background tasks so cancel never blocks on a slow host.
    fn kill_remote_processes(&self, config: &JobConfig) -> Vec<tokio::task::JoinHandle<()>> {
        let source_cmd = "pkill -f 'rclone copyto'; pkill -f 'zip -q'; true";
        let dest_cmd = "pkill -f 'rclone copyto'; pkill -f 'unzip'; true";

        let mut tasks = Vec::with_capacity(config.destinations.len() + 1);
        let shell = self.shell.clone();
        let source = config.source_host_id.clone();
        tasks.push(tokio::spawn(async move {
            let _ = shell.exec(&source, source_cmd).await;
        }));

        for dest in &config.destinations {
            let shell = self.shell.clone();
            let host = dest.host_id.clone();
            tasks.push(tokio::spawn(async move {
                let _ = shell.exec(&host, dest_cmd).await;
            }));
        }
        tasks
    }

    // ------------------------------------------------------------------
    // state application
    // ------------------------------------------------------------------

    fn apply(&self, job: &mut Job, msg: JobMsg, source_failure: &mut Option<TransferError>) {
        let job_id = job.config.id.clone();
        match msg {
            JobMsg::PartState {
                part_id,
                status,
                percent,
            } => {
                let mut changed = false;
                if let Some(part) = job.part_mut(&part_id) {
                    changed = part.status != status;
                    part.status = status;
                }
                if changed {
                    self.persist(job);
                }
                self.bus.publish(TransferEvent::PartStateChanged {
                    job_id,
                    part_id,
                    status,
                    percent,
                });
            }
            JobMsg::PartMeta {
                part_id,
                size,
                store_path,
            } => {
                if let Some(part) = job.part_mut(&part_id) {
                    part.size = size;
                    part.store_path = store_path;
                }
                self.persist(job);
            }
            JobMsg::PartUploaded { part_id } => {
                let mut snapshot = None;
                if let Some(part) = job.part_mut(&part_id) {
                    part.status = PartStatus::Uploaded;
                    snapshot = Some((
                        part.filename.clone(),
                        part.store_path.clone(),
                        part.size,
                        part.destinations.clone(),
                    ));
                }
                self.persist(job);
                self.bus.publish(TransferEvent::PartStateChanged {
                    job_id: job_id.clone(),
                    part_id: part_id.clone(),
                    status: PartStatus::Uploaded,
                    percent: 100,
                });
                if let Some((filename, store_path, size, destinations)) = snapshot {
                    self.bus.publish(TransferEvent::PartUploaded {
                        job_id,
                        part_id,
                        filename,
                        store_path,
                        size,
                        destinations,
                    });
                }
            }
            JobMsg::PartSettled { part_id } => {
                let mut status = None;
                if let Some(part) = job.part_mut(&part_id) {
                    let any_completed = part
                        .destinations
                        .iter()
                        .any(|d| d.status == DestStatus::Completed);
                    part.status = if any_completed {
                        PartStatus::Completed
                    } else {
                        PartStatus::Failed
                    };
                    status = Some(part.status);
                }
                if let Some(status) = status {
                    self.persist(job);
                    self.bus.publish(TransferEvent::PartStateChanged {
                        job_id,
                        part_id,
                        status,
                        percent: 100,
                    });
                }
            }
            JobMsg::DestState {
                part_id,
                host_id,
                status,
                percent,
                error,
            } => {
                let mut publish_percent = percent;
                let mut status_changed = false;
                if let Some(slot) = job
                    .part_mut(&part_id)
                    .and_then(|p| p.destination_mut(&host_id))
                {
                    status_changed = slot.status != status;
                    match status {
                        DestStatus::Failed => {
                            slot.status = status;
                            slot.error = error.clone();
                        }
                        DestStatus::Pending => {
                            slot.status = status;
                            slot.percent = 0;
                            slot.error = None;
                        }
                        _ => {
                            slot.status = status;
                            // Monotonic within a slot's lifetime.
                            slot.percent = slot.percent.max(percent.min(100));
                        }
                    }
                    publish_percent = slot.percent;
                }
                if status_changed {
                    self.persist(job);
                }
                self.bus.publish(TransferEvent::PartDestProgress {
                    job_id,
                    part_id,
                    host_id,
                    status,
                    percent: publish_percent,
                    error,
                });
            }
            JobMsg::DestPrepFailed { host_id, error } => {
                let part_ids: Vec<String> = job.parts.iter().map(|p| p.id.clone()).collect();
                for part in &mut job.parts {
                    if let Some(slot) = part.destination_mut(&host_id) {
                        slot.status = DestStatus::Failed;
                        slot.error = Some(error.clone());
                    }
                }
                self.persist(job);
                for part_id in part_ids {
                    self.bus.publish(TransferEvent::PartDestProgress {
                        job_id: job_id.clone(),
                        part_id,
                        host_id: host_id.clone(),
                        status: DestStatus::Failed,
                        percent: 0,
                        error: Some(error.clone()),
                    });
                }
                self.emit_log(
                    LogLevel::Error,
                    &job_id,
                    format!("[Dest] Preparation failed: {error}"),
                    Some(host_id),
                    None,
                );
            }
            JobMsg::SourceFailed { error } => {
                if source_failure.is_none() {
                    *source_failure = Some(error);
                }
            }
            JobMsg::Log {
                level,
                message,
                host_id,
                part_id,
            } => {
                self.emit_log(level, &job_id, message, host_id, part_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // finalization
    // ------------------------------------------------------------------

    async fn finalize(
        &self,
        mut job: Job,
        archive: &ArchiveName,
        needs_split: bool,
        source_failure: Option<TransferError>,
        cancelled: bool,
    ) -> Job {
        if cancelled {
            return self.fail_job(job, TransferError::Cancelled).await;
        }
        if let Some(error) = source_failure {
            return self.fail_job(job, error).await;
        }

        // Destinations that staged every part.
        let completed: Vec<String> = job
            .config
            .destinations
            .iter()
            .filter(|d| {
                !job.parts.is_empty()
                    && job.parts.iter().all(|p| {
                        p.destination(&d.host_id)
                            .map(|s| s.status == DestStatus::Completed)
                            .unwrap_or(false)
                    })
            })
            .map(|d| d.host_id.clone())
            .collect();

        if needs_split && job.config.auto_extract && !completed.is_empty() {
            self.bulk_extract(&job, archive, &completed).await;
        }

        if completed.is_empty() {
            return self
                .fail_job(
                    job,
                    TransferError::Download("no destination completed all parts".into()),
                )
                .await;
        }

        job.status = JobStatus::Completed;
        job.finished_at = Some(Utc::now());
        self.persist(&job);
        self.emit_log(
            LogLevel::Info,
            &job.config.id,
            format!(
                "[Complete] {} destination(s) received all {} part(s)",
                completed.len(),
                job.parts.len()
            ),
            None,
            None,
        );
        self.bus.publish(TransferEvent::JobCompleted {
            job_id: job.config.id.clone(),
        });
        info!(job = %job.config.id, "job completed");
        job
    }

    /// Split-archive post-processing: one extract over the part glob per
    /// completed destination, in parallel. Failures are logged and do not
    /// affect other destinations.
    async fn bulk_extract(&self, job: &Job, archive: &ArchiveName, dest_ids: &[String]) {
        let glob = archive.part_glob();
        let mut handles = Vec::new();

        for dest in &job.config.destinations {
            if !dest_ids.contains(&dest.host_id) {
                continue;
            }
            let shell = self.shell.clone();
            let host_id = dest.host_id.clone();
            let folder = dest.folder.clone();
            let glob = glob.clone();
            handles.push(tokio::spawn(async move {
                let result = dispatcher::bulk_extract(&shell, &host_id, &folder, &glob).await;
                (host_id, result)
            }));
        }

        for handle in handles {
            let Ok((host_id, result)) = handle.await else {
                continue;
            };
            match result {
                Ok(()) => self.emit_log(
                    LogLevel::Info,
                    &job.config.id,
                    format!("[Extract] Bulk extract finished ({glob})"),
                    Some(host_id),
                    None,
                ),
                Err(e) => self.emit_log(
                    LogLevel::Error,
                    &job.config.id,
                    format!("[Error] Bulk extract failed: {e}"),
                    Some(host_id),
                    None,
                ),
            }
        }
    }

    async fn fail_job(&self, mut job: Job, error: TransferError) -> Job {
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.finished_at = Some(Utc::now());
        // Parts the pipeline never finished are failed, not left mid-state.
        for part in &mut job.parts {
            if part.status != PartStatus::Completed {
                part.status = PartStatus::Failed;
            }
        }
        self.persist(&job);
        self.emit_log(
            LogLevel::Error,
            &job.config.id,
            format!("[Error] {error}"),
            None,
            None,
        );
        self.bus.publish(TransferEvent::JobFailed {
            job_id: job.config.id.clone(),
            error: error.to_string(),
        });
        error!(job = %job.config.id, error = %error, "job failed");
        job
    }

    fn persist(&self, job: &Job) {
        if let Err(e) = self.store.save_job(job.clone()) {
            warn!(job = %job.config.id, error = %e, "failed to persist job snapshot");
        }
    }

    fn emit_log(
        &self,
        level: LogLevel,
        job_id: &str,
        message: String,
        host_id: Option<String>,
        part_id: Option<String>,
    ) {
        let mut entry = LogEntry::new(level, message).with_job(job_id);
        entry.host_id = host_id;
        entry.part_id = part_id;
        self.bus.publish(TransferEvent::Log(entry));
    }
}

/// Recovers the shared base name from a part filename.
fn archive_name_of(filename: &str) -> ArchiveName {
    let base = filename
        .split(".part")
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".zip");
    let millis = base
        .strip_prefix("transfer_")
        .and_then(|d| d.parse::<i64>().ok())
        .unwrap_or_default();
    ArchiveName::at_epoch_ms(millis)
}
