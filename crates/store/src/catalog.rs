//! Server catalog: host records with encrypted credentials.

use std::sync::Arc;

use tracing::warn;

use cloudferry_protocol::Host;
use cloudferry_shell_pool::HostDirectory;

use crate::{DocumentStore, EncryptionAdapter, StoreError};

/// Host CRUD over the document store.
///
/// Credential fields are encrypted on the way in and decrypted on the way
/// out, so the store file never holds plaintext. The catalog also backs
/// the session pool's host lookup.
pub struct ServerCatalog {
    store: Arc<DocumentStore>,
    crypto: Arc<dyn EncryptionAdapter>,
}

impl ServerCatalog {
    pub fn new(store: Arc<DocumentStore>, crypto: Arc<dyn EncryptionAdapter>) -> Self {
        Self { store, crypto }
    }

    /// Whether credentials are protected by a real secret service.
    pub fn secrets_available(&self) -> bool {
        self.crypto.is_available()
    }

    /// Persists a host, encrypting its credential fields.
    pub fn save(&self, mut host: Host) -> Result<(), StoreError> {
        host.password = host.password.map(|p| self.crypto.encrypt(&p));
        host.passphrase = host.passphrase.map(|p| self.crypto.encrypt(&p));
        self.store.upsert_server(host)
    }

    /// Returns a host with decrypted credentials.
    pub fn host(&self, id: &str) -> Option<Host> {
        self.store.server(id).map(|h| self.decrypt_host(h))
    }

    /// Returns all hosts with decrypted credentials.
    pub fn hosts(&self) -> Vec<Host> {
        self.store
            .servers()
            .into_iter()
            .map(|h| self.decrypt_host(h))
            .collect()
    }

    /// Deletes a host; refused while an active job references it.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete_server(id)
    }

    fn decrypt_host(&self, mut host: Host) -> Host {
        host.password = host.password.and_then(|p| self.decrypt_field(&host.id, p));
        host.passphrase = host
            .passphrase
            .and_then(|p| self.decrypt_field(&host.id, p));
        host
    }

    fn decrypt_field(&self, host_id: &str, stored: String) -> Option<String> {
        let decrypted = self.crypto.decrypt(&stored);
        if decrypted.is_none() {
            warn!(host = %host_id, "credential field could not be decoded");
        }
        decrypted
    }
}

impl HostDirectory for ServerCatalog {
    fn host(&self, id: &str) -> Option<Host> {
        ServerCatalog::host(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReversibleEncoder;

    fn catalog() -> (tempfile::TempDir, ServerCatalog, Arc<DocumentStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(DocumentStore::open(tmp.path().join("store.json")).unwrap());
        let catalog = ServerCatalog::new(store.clone(), Arc::new(ReversibleEncoder));
        (tmp, catalog, store)
    }

    fn host_with_password(id: &str, password: &str) -> Host {
        Host {
            id: id.into(),
            name: "nas".into(),
            address: "10.0.0.2".into(),
            username: "ops".into(),
            password: Some(password.into()),
            key_path: None,
            passphrase: None,
        }
    }

    #[test]
    fn credentials_never_stored_plaintext() {
        let (tmp, catalog, _store) = catalog();
        catalog.save(host_with_password("h1", "hunter2")).unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("store.json")).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(raw.contains("b64:"));
    }

    #[test]
    fn roundtrip_decrypts() {
        let (_tmp, catalog, _store) = catalog();
        catalog.save(host_with_password("h1", "hunter2")).unwrap();

        let host = catalog.host("h1").unwrap();
        assert_eq!(host.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn passphrase_encrypted_too() {
        let (_tmp, catalog, store) = catalog();
        let mut host = host_with_password("h1", "pw");
        host.key_path = Some("/home/ops/.ssh/id_ed25519".into());
        host.passphrase = Some("secret phrase".into());
        catalog.save(host).unwrap();

        let stored = store.server("h1").unwrap();
        assert!(stored.passphrase.unwrap().starts_with("b64:"));
        assert_eq!(
            catalog.host("h1").unwrap().passphrase.as_deref(),
            Some("secret phrase")
        );
    }

    #[test]
    fn directory_lookup_is_decrypted() {
        let (_tmp, catalog, _store) = catalog();
        catalog.save(host_with_password("h1", "pw")).unwrap();

        let dir: &dyn HostDirectory = &catalog;
        assert_eq!(dir.host("h1").unwrap().password.as_deref(), Some("pw"));
        assert!(dir.host("missing").is_none());
    }

    #[test]
    fn fallback_adapter_reports_unavailable() {
        let (_tmp, catalog, _store) = catalog();
        assert!(!catalog.secrets_available());
    }
}
