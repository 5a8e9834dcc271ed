//! The namespaced JSON document store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cloudferry_protocol::{Host, Job};

use crate::StoreError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Namespaces {
    #[serde(default)]
    servers: Vec<Host>,
    #[serde(default)]
    jobs: Vec<Job>,
    /// Opaque per-tab operator state owned by the presentation layer.
    #[serde(default)]
    session: HashMap<String, serde_json::Value>,
}

/// One JSON file holding the `servers`, `jobs` and `session` namespaces.
///
/// Contents are cached in memory; every mutation persists through a
/// temp-file rename so a crash cannot truncate the store.
pub struct DocumentStore {
    path: PathBuf,
    data: RwLock<Namespaces>,
}

impl DocumentStore {
    /// Opens the store, loading existing contents from disk.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let data = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Namespaces::default()
        };
        debug!(path = %path.display(), "document store opened");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn persist(&self, data: &Namespaces) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // servers
    // ------------------------------------------------------------------

    /// Returns all host records as stored (credentials still encrypted).
    pub fn servers(&self) -> Vec<Host> {
        self.data.read().unwrap().servers.clone()
    }

    pub fn server(&self, id: &str) -> Option<Host> {
        self.data
            .read()
            .unwrap()
            .servers
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    /// Inserts or replaces a host record.
    pub fn upsert_server(&self, host: Host) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap();
        match data.servers.iter_mut().find(|h| h.id == host.id) {
            Some(existing) => *existing = host,
            None => data.servers.push(host),
        }
        self.persist(&data)
    }

    /// Removes a host record.
    ///
    /// Refused while any job in a non-terminal state references the host.
    pub fn delete_server(&self, id: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap();

        let in_use = data.jobs.iter().any(|job| {
            !job.status.is_terminal()
                && (job.config.source_host_id == id
                    || job.config.destinations.iter().any(|d| d.host_id == id))
        });
        if in_use {
            return Err(StoreError::HostInUse(id.to_string()));
        }

        let before = data.servers.len();
        data.servers.retain(|h| h.id != id);
        if data.servers.len() == before {
            return Err(StoreError::NotFound(format!("host {id}")));
        }
        self.persist(&data)
    }

    // ------------------------------------------------------------------
    // jobs
    // ------------------------------------------------------------------

    pub fn jobs(&self) -> Vec<Job> {
        self.data.read().unwrap().jobs.clone()
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.data
            .read()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.config.id == id)
            .cloned()
    }

    /// Inserts or replaces a job snapshot.
    pub fn save_job(&self, job: Job) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap();
        match data.jobs.iter_mut().find(|j| j.config.id == job.config.id) {
            Some(existing) => *existing = job,
            None => data.jobs.push(job),
        }
        self.persist(&data)
    }

    pub fn delete_job(&self, id: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap();
        let before = data.jobs.len();
        data.jobs.retain(|j| j.config.id != id);
        if data.jobs.len() == before {
            return Err(StoreError::NotFound(format!("job {id}")));
        }
        self.persist(&data)
    }

    // ------------------------------------------------------------------
    // session
    // ------------------------------------------------------------------

    pub fn session_get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().unwrap().session.get(key).cloned()
    }

    pub fn session_set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap();
        data.session.insert(key.to_string(), value);
        self.persist(&data)
    }
}
