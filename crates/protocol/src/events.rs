//! Lifecycle events published by the transfer pipeline.
//!
//! Presentation layers subscribe to a stream of [`TransferEvent`] values;
//! the pipeline never exposes its mutable job state directly. Human-readable
//! log messages carry bracketed prefixes (`[Zip]`, `[Upload]`, `[Dest]`, …)
//! that subscribers may use for coarse classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DestStatus, DestinationProgress, PartStatus};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

/// An append-only log record attached to the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,
}

impl LogEntry {
    /// Creates a record stamped now with a fresh id.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            job_id: None,
            host_id: None,
            part_id: None,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_host(mut self, host_id: impl Into<String>) -> Self {
        self.host_id = Some(host_id.into());
        self
    }

    pub fn with_part(mut self, part_id: impl Into<String>) -> Self {
        self.part_id = Some(part_id.into());
        self
    }
}

/// One event on the pipeline's multicast stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TransferEvent {
    /// A job left `Idle` and its workers are starting.
    #[serde(rename_all = "camelCase")]
    JobStarted { job_id: String, name: String },

    /// Coarse setup progress ("connecting source", "planning batches", …).
    #[serde(rename_all = "camelCase")]
    JobStepAdvanced {
        job_id: String,
        step: u32,
        total_steps: u32,
        message: String,
    },

    /// A part moved through its source-side state machine.
    #[serde(rename_all = "camelCase")]
    PartStateChanged {
        job_id: String,
        part_id: String,
        status: PartStatus,
        percent: u8,
    },

    /// A part finished uploading and is visible to dispatchers.
    #[serde(rename_all = "camelCase")]
    PartUploaded {
        job_id: String,
        part_id: String,
        filename: String,
        store_path: String,
        size: u64,
        destinations: Vec<DestinationProgress>,
    },

    /// A destination's progress on one part changed.
    #[serde(rename_all = "camelCase")]
    PartDestProgress {
        job_id: String,
        part_id: String,
        host_id: String,
        status: DestStatus,
        percent: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Every destination finished every part.
    #[serde(rename_all = "camelCase")]
    JobCompleted { job_id: String },

    /// The job reached its failure terminal.
    #[serde(rename_all = "camelCase")]
    JobFailed { job_id: String, error: String },

    /// A human-readable log line.
    Log(LogEntry),
}

impl TransferEvent {
    /// The job this event belongs to, when it names one.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            TransferEvent::JobStarted { job_id, .. }
            | TransferEvent::JobStepAdvanced { job_id, .. }
            | TransferEvent::PartStateChanged { job_id, .. }
            | TransferEvent::PartUploaded { job_id, .. }
            | TransferEvent::PartDestProgress { job_id, .. }
            | TransferEvent::JobCompleted { job_id }
            | TransferEvent::JobFailed { job_id, .. } => Some(job_id),
            TransferEvent::Log(entry) => entry.job_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_builder_sets_ids() {
        let entry = LogEntry::new(LogLevel::Warn, "[Dest] install failed")
            .with_job("j1")
            .with_host("h2")
            .with_part("p3");
        assert_eq!(entry.job_id.as_deref(), Some("j1"));
        assert_eq!(entry.host_id.as_deref(), Some("h2"));
        assert_eq!(entry.part_id.as_deref(), Some("p3"));
        assert_eq!(entry.level, LogLevel::Warn);
    }

    #[test]
    fn event_json_tags_variant() {
        let event = TransferEvent::JobCompleted {
            job_id: "j1".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"jobCompleted\""));
        assert!(json.contains("\"jobId\":\"j1\""));
    }

    #[test]
    fn event_json_roundtrip() {
        let event = TransferEvent::PartDestProgress {
            job_id: "j1".into(),
            part_id: "p1".into(),
            host_id: "d1".into(),
            status: DestStatus::Downloading,
            percent: 42,
            error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("error"));
        let parsed: TransferEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn job_id_accessor() {
        let event = TransferEvent::JobFailed {
            job_id: "j9".into(),
            error: "upload failed".into(),
        };
        assert_eq!(event.job_id(), Some("j9"));

        let log = TransferEvent::Log(LogEntry::new(LogLevel::Info, "[Queue] part ready"));
        assert_eq!(log.job_id(), None);
    }
}
