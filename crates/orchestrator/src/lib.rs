//! The cloudferry transfer pipeline.
//!
//! One [`Orchestrator`] drives one job: it plans batches from the source
//! folder inventory, packages and uploads archive parts on the source
//! host, and fans each uploaded part out to every destination host, which
//! downloads, stages and optionally extracts it. Packaging, upload,
//! download and extraction overlap across independent parts, so
//! end-to-end latency is bounded by the slowest stage of the slowest
//! part rather than their sum.
//!
//! # Pipeline
//!
//! 1. **Setup**: connect the source, ensure the store tool, plan batches
//! 2. **Package**: per batch, build a file list, archive, stat, upload
//! 3. **Distribute**: per part and destination, download, stage, extract
//! 4. **Finalize**: bulk extract for split archives, store cleanup
//!
//! The orchestrator task exclusively owns the [`Job`] record while it
//! runs; workers report through messages, and every observer consumes
//! the [`EventBus`] stream instead of shared state.
//!
//! [`Job`]: cloudferry_protocol::Job

mod bus;
mod dispatcher;
mod orchestrator;
mod packager;
mod planner;
mod progress;

pub use bus::EventBus;
pub use orchestrator::{JobController, Orchestrator};
pub use planner::{first_fit, plan, Batch, FileEntry, Plan};
pub use progress::job_percent;

use cloudferry_store::StoreError;

/// Errors that terminate a job or one of its branches.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    /// Dial or auth failure. Fatal on the source; per-destination
    /// otherwise.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The store tool could not be installed on a host.
    #[error("tool install failed: {0}")]
    ToolInstall(String),

    /// The source folder inventory was empty or unreadable.
    #[error("planning failed: {0}")]
    Plan(String),

    /// Archive creation or stat failed; no partial part is published.
    #[error("packaging failed: {0}")]
    Package(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("extract failed: {0}")]
    Extract(String),

    #[error("store delete failed: {0}")]
    StoreDelete(String),

    #[error("no store config with id {0}")]
    UnknownStoreConfig(String),

    #[error("cancelled by operator")]
    Cancelled,
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        TransferError::Plan(format!("store: {e}"))
    }
}

impl TransferError {
    /// True for failures that abort the whole job when they occur on the
    /// source-side pipeline.
    pub fn is_source_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::Connect(_)
                | TransferError::ToolInstall(_)
                | TransferError::Plan(_)
                | TransferError::Package(_)
                | TransferError::Upload(_)
                | TransferError::UnknownStoreConfig(_)
                | TransferError::Cancelled
        )
    }
}
