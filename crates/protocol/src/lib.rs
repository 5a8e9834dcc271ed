//! Shared data model for cloudferry folder transfers.
//!
//! This crate defines the types that cross crate boundaries: hosts and
//! store bindings, job and part records with their per-destination
//! progress, the lifecycle event stream consumed by presentation layers,
//! and the archive naming scheme shared by the source and destination
//! sides of a transfer.

pub mod events;
pub mod naming;
pub mod types;

// Re-export primary types for convenience.
pub use events::{LogEntry, LogLevel, TransferEvent};
pub use naming::ArchiveName;
pub use types::{
    ArchiveStoreConfig, DestStatus, Destination, DestinationProgress, Host, Job, JobConfig,
    JobStatus, Part, PartStatus,
};
