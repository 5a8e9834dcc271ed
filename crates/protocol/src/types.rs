//! Core records: hosts, store bindings, jobs, parts, destination progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reachable remote machine.
///
/// `address` is `host` or `host:port`; [`Host::dial_address`] appends the
/// default SSH port when none is given. Credential fields (`password`,
/// `passphrase`) are encrypted by the persistence layer before they touch
/// disk; in-memory instances hold the decrypted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    pub name: String,
    pub address: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl Host {
    /// Returns `host:port`, defaulting to port 22.
    pub fn dial_address(&self) -> String {
        if self.address.contains(':') {
            self.address.clone()
        } else {
            format!("{}:22", self.address)
        }
    }
}

/// A named binding of an object-store remote to a folder within it.
///
/// `remote_name` is the section name in the CLI tool's config file
/// (e.g. `gdrive`); authorization material for it is assumed to already
/// exist in that config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStoreConfig {
    pub id: String,
    pub name: String,
    pub remote_name: String,
    pub folder: String,
}

/// One destination of a job: where downloaded parts land on which host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub host_id: String,
    pub folder: String,
    pub store_config_id: String,
}

/// Immutable inputs of a job, fixed at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub id: String,
    pub name: String,
    pub source_host_id: String,
    pub source_folder: String,
    pub destinations: Vec<Destination>,
    pub store_folder: String,
    /// Per-part size ceiling in mebibytes.
    pub part_size_mib: u64,
    pub delete_local_after_upload: bool,
    pub delete_from_store_after_all_dest_done: bool,
    pub auto_extract: bool,
}

impl JobConfig {
    /// Part size ceiling in bytes.
    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_mib * 1024 * 1024
    }

    /// Validates structural invariants.
    ///
    /// A job needs a non-empty source folder and at least one destination;
    /// destination hosts must be pairwise distinct and distinct from the
    /// source host.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_folder.trim().is_empty() {
            return Err("source folder is empty".into());
        }
        if self.destinations.is_empty() {
            return Err("job has no destinations".into());
        }
        if self.part_size_mib == 0 {
            return Err("part size must be at least 1 MiB".into());
        }
        for (i, dest) in self.destinations.iter().enumerate() {
            if dest.host_id == self.source_host_id {
                return Err(format!(
                    "destination {} is the source host {}",
                    i + 1,
                    self.source_host_id
                ));
            }
            for other in &self.destinations[i + 1..] {
                if other.host_id == dest.host_id {
                    return Err(format!("duplicate destination host {}", dest.host_id));
                }
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "cancelling")]
    Cancelling,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States in which the pipeline has live workers.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Paused | JobStatus::Cancelling
        )
    }
}

/// One execution of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub config: JobConfig,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Creates a new idle job from validated inputs.
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            status: JobStatus::Idle,
            parts: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == part_id)
    }

    pub fn part_mut(&mut self, part_id: &str) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| p.id == part_id)
    }
}

/// State of one archive segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "packaging")]
    Packaging,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "uploaded")]
    Uploaded,
    #[serde(rename = "distributing")]
    Distributing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

/// One archive segment of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: String,
    /// 1-based index; rendered zero-padded in split archive filenames.
    pub index: u32,
    pub filename: String,
    /// Archive size in bytes, known after packaging.
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub store_path: String,
    pub status: PartStatus,
    pub destinations: Vec<DestinationProgress>,
    #[serde(default)]
    pub retry_count: u32,
}

impl Part {
    /// Creates a pending part with one fresh progress slot per destination.
    pub fn new(index: u32, filename: String, dest_host_ids: &[String]) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            index,
            filename,
            size: 0,
            store_path: String::new(),
            status: PartStatus::Pending,
            destinations: dest_host_ids
                .iter()
                .map(|id| DestinationProgress::new(id.clone()))
                .collect(),
            retry_count: 0,
        }
    }

    pub fn destination(&self, host_id: &str) -> Option<&DestinationProgress> {
        self.destinations.iter().find(|d| d.host_id == host_id)
    }

    pub fn destination_mut(&mut self, host_id: &str) -> Option<&mut DestinationProgress> {
        self.destinations.iter_mut().find(|d| d.host_id == host_id)
    }

    /// Resets the part and every destination slot for an operator retry.
    pub fn reset_for_retry(&mut self) {
        self.status = PartStatus::Pending;
        self.size = 0;
        self.store_path = String::new();
        self.retry_count += 1;
        for dest in &mut self.destinations {
            dest.status = DestStatus::Pending;
            dest.percent = 0;
            dest.error = None;
        }
    }
}

/// State of one part on one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "downloading")]
    Downloading,
    #[serde(rename = "staging")]
    Staging,
    #[serde(rename = "extracting")]
    Extracting,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

/// Per-part, per-destination progress record.
///
/// `percent` is monotonic non-decreasing for the life of the slot except
/// on the transition to `Failed` or the reset back to `Pending` that an
/// operator retry performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationProgress {
    pub host_id: String,
    pub status: DestStatus,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DestinationProgress {
    pub fn new(host_id: String) -> Self {
        Self {
            host_id,
            status: DestStatus::Pending,
            percent: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> JobConfig {
        JobConfig {
            id: "job-1".into(),
            name: "media".into(),
            source_host_id: "src".into(),
            source_folder: "/srv/media".into(),
            destinations: vec![
                Destination {
                    host_id: "d1".into(),
                    folder: "/data/media".into(),
                    store_config_id: "gdrive-main".into(),
                },
                Destination {
                    host_id: "d2".into(),
                    folder: "/data/media".into(),
                    store_config_id: "gdrive-main".into(),
                },
            ],
            store_folder: "transfers".into(),
            part_size_mib: 1024,
            delete_local_after_upload: true,
            delete_from_store_after_all_dest_done: true,
            auto_extract: true,
        }
    }

    #[test]
    fn dial_address_defaults_port() {
        let mut host = Host {
            id: "h1".into(),
            name: "nas".into(),
            address: "10.0.0.2".into(),
            username: "ops".into(),
            password: None,
            key_path: None,
            passphrase: None,
        };
        assert_eq!(host.dial_address(), "10.0.0.2:22");
        host.address = "10.0.0.2:2222".into();
        assert_eq!(host.dial_address(), "10.0.0.2:2222");
    }

    #[test]
    fn config_validate_ok() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn config_rejects_empty_source_folder() {
        let mut cfg = sample_config();
        cfg.source_folder = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_rejects_no_destinations() {
        let mut cfg = sample_config();
        cfg.destinations.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_rejects_source_as_destination() {
        let mut cfg = sample_config();
        cfg.destinations[1].host_id = "src".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_rejects_duplicate_destinations() {
        let mut cfg = sample_config();
        cfg.destinations[1].host_id = "d1".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn job_status_terminality() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
        assert!(JobStatus::Cancelling.is_active());
        assert!(!JobStatus::Idle.is_active());
    }

    #[test]
    fn part_new_has_pending_slots() {
        let part = Part::new(1, "transfer_1.zip".into(), &["d1".into(), "d2".into()]);
        assert_eq!(part.status, PartStatus::Pending);
        assert_eq!(part.destinations.len(), 2);
        assert!(part
            .destinations
            .iter()
            .all(|d| d.status == DestStatus::Pending && d.percent == 0));
    }

    #[test]
    fn part_reset_for_retry() {
        let mut part = Part::new(2, "a.part002.zip".into(), &["d1".into()]);
        part.status = PartStatus::Failed;
        part.size = 512;
        part.store_path = "transfers/a.part002.zip".into();
        {
            let d = part.destination_mut("d1").unwrap();
            d.status = DestStatus::Failed;
            d.percent = 40;
            d.error = Some("download failed".into());
        }

        part.reset_for_retry();

        assert_eq!(part.status, PartStatus::Pending);
        assert_eq!(part.size, 0);
        assert_eq!(part.retry_count, 1);
        let d = part.destination("d1").unwrap();
        assert_eq!(d.status, DestStatus::Pending);
        assert_eq!(d.percent, 0);
        assert!(d.error.is_none());
    }

    #[test]
    fn job_json_roundtrip() {
        let mut job = Job::new(sample_config());
        job.parts
            .push(Part::new(1, "transfer_1.zip".into(), &["d1".into()]));
        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(job, parsed);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelling).unwrap(),
            "\"cancelling\""
        );
        assert_eq!(
            serde_json::to_string(&DestStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(
            serde_json::to_string(&PartStatus::Distributing).unwrap(),
            "\"distributing\""
        );
    }
}
