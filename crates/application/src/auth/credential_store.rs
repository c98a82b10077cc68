//! Credential storage.
//!
//! The store keeps the current token and principal as one pair: an
//! in-memory snapshot behind a single lock, mirrored to a durable
//! [`KeyValueStore`]. Readers never observe a token without its principal
//! or the other way round.
//!
//! Every write bumps a generation counter. A caller that read the store
//! before a long operation can later write back only if nobody replaced or
//! cleared the credential meanwhile.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokenrelay_domain::{AuthSettings, Credential, Principal};
use tracing::{debug, warn};

use crate::ports::{InMemoryKeyValueStore, KeyValueStore, StorageError};

/// Durable keys the credential pair is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Key of the bearer token.
    pub token: String,
    /// Key of the JSON-encoded principal.
    pub principal: String,
}

impl StorageKeys {
    /// Takes the keys from the settings.
    #[must_use]
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self {
            token: settings.token_key.clone(),
            principal: settings.principal_key.clone(),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::from_settings(&AuthSettings::default())
    }
}

#[derive(Debug, Default)]
struct Slot {
    credential: Option<Credential>,
    generation: u64,
}

impl Slot {
    fn replace(&mut self, credential: Option<Credential>) {
        self.credential = credential;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Thread-safe holder of the current credential.
#[derive(Clone)]
pub struct CredentialStore {
    current: Arc<RwLock<Slot>>,
    backend: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl CredentialStore {
    /// Opens a store over `backend`, restoring any persisted credential.
    ///
    /// A persisted principal without a token is an inconsistent pair left by
    /// an interrupted write and is erased.
    #[must_use]
    pub fn open(backend: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        let token = read_or_warn(backend.as_ref(), &keys.token);
        let principal_json = read_or_warn(backend.as_ref(), &keys.principal);

        let restored = match (token, principal_json) {
            (Some(token), principal_json) => {
                let principal = principal_json.and_then(|json| {
                    serde_json::from_str::<Principal>(&json)
                        .inspect_err(|e| warn!(error = %e, "discarding unreadable stored principal"))
                        .ok()
                });
                debug!(has_principal = principal.is_some(), "restored persisted credential");
                Some(Credential::new(token, principal))
            }
            (None, Some(_)) => {
                warn!("stored principal has no token, erasing it");
                if let Err(e) = backend.remove(&keys.principal) {
                    warn!(error = %e, "failed to erase orphaned principal");
                }
                None
            }
            (None, None) => None,
        };

        Self {
            current: Arc::new(RwLock::new(Slot {
                credential: restored,
                generation: 0,
            })),
            backend,
            keys,
        }
    }

    /// Creates a store that only lives as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(Arc::new(InMemoryKeyValueStore::new()), StorageKeys::default())
    }

    /// Stores a credential, replacing the current one.
    ///
    /// Token and principal are written under one lock. If the second write
    /// fails the previous pair is put back and the error returned.
    ///
    /// # Errors
    /// Returns an error if the credential cannot be persisted.
    pub fn set(&self, credential: Credential) -> Result<(), StorageError> {
        self.write(credential, None).map(|_| ())
    }

    /// Stores a credential only if the store is still at `generation`.
    ///
    /// Returns `Ok(false)` without touching anything when another write or a
    /// clear happened since the generation was read.
    ///
    /// # Errors
    /// Returns an error if the credential cannot be persisted.
    pub fn set_if_generation(
        &self,
        credential: Credential,
        generation: u64,
    ) -> Result<bool, StorageError> {
        self.write(credential, Some(generation))
    }

    /// Returns the current credential.
    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.current.read().credential.clone()
    }

    /// Returns the current credential together with the store generation.
    #[must_use]
    pub fn snapshot(&self) -> (Option<Credential>, u64) {
        let slot = self.current.read();
        (slot.credential.clone(), slot.generation)
    }

    /// Returns the generation, bumped by every write and clear.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Returns the current token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .credential
            .as_ref()
            .map(|c| c.token.clone())
    }

    /// Returns the current principal.
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.current
            .read()
            .credential
            .as_ref()
            .and_then(|c| c.principal.clone())
    }

    /// Returns true if a token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.read().credential.is_some()
    }

    /// Erases token and principal. Never fails; backend errors are logged.
    pub fn clear(&self) {
        let mut slot = self.current.write();
        self.erase(&mut slot);
    }

    /// Erases the credential only if the store is still at `generation`.
    ///
    /// Returns false if a newer write or clear got there first.
    pub fn clear_if_generation(&self, generation: u64) -> bool {
        let mut slot = self.current.write();
        if slot.generation != generation {
            return false;
        }
        self.erase(&mut slot);
        true
    }

    fn write(&self, credential: Credential, expected: Option<u64>) -> Result<bool, StorageError> {
        let principal_json = credential
            .principal
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut slot = self.current.write();
        if expected.is_some_and(|generation| generation != slot.generation) {
            debug!("credential changed meanwhile, write skipped");
            return Ok(false);
        }
        if let Err(e) = self.persist(&credential.token, principal_json.as_deref()) {
            self.restore(slot.credential.as_ref());
            return Err(e);
        }
        debug!(token = %credential.token_preview(), "credential stored");
        slot.replace(Some(credential));
        Ok(true)
    }

    fn erase(&self, slot: &mut Slot) {
        for key in [&self.keys.token, &self.keys.principal] {
            if let Err(e) = self.backend.remove(key) {
                warn!(key = %key, error = %e, "failed to erase stored credential");
            }
        }
        slot.replace(None);
    }

    fn persist(&self, token: &str, principal_json: Option<&str>) -> Result<(), StorageError> {
        self.backend.set(&self.keys.token, token)?;
        match principal_json {
            Some(json) => self.backend.set(&self.keys.principal, json),
            None => self.backend.remove(&self.keys.principal),
        }
    }

    fn restore(&self, previous: Option<&Credential>) {
        let outcome = match previous {
            Some(credential) => {
                let json = credential
                    .principal
                    .as_ref()
                    .and_then(|p| serde_json::to_string(p).ok());
                self.persist(&credential.token, json.as_deref())
            }
            None => self
                .backend
                .remove(&self.keys.token)
                .and_then(|()| self.backend.remove(&self.keys.principal)),
        };
        if let Err(e) = outcome {
            warn!(error = %e, "failed to roll back credential write");
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &self.current.read().credential)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

fn read_or_warn(backend: &dyn KeyValueStore, key: &str) -> Option<String> {
    backend
        .get(key)
        .inspect_err(|e| warn!(key = %key, error = %e, "failed to read stored credential"))
        .ok()
        .flatten()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Backend that refuses writes to one key.
    struct FailingKey {
        inner: InMemoryKeyValueStore,
        failing: &'static str,
    }

    impl KeyValueStore for FailingKey {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.failing {
                return Err(StorageError::Serialization("disk full".to_string()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    fn alice() -> Principal {
        Principal::new("alice", ["ADMIN"])
    }

    #[test]
    fn test_set_and_get_credential() {
        let store = CredentialStore::in_memory();
        store
            .set(Credential::new("t1", Some(alice())))
            .expect("set should succeed");

        assert_eq!(store.token().as_deref(), Some("t1"));
        assert_eq!(store.principal(), Some(alice()));
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_clear_erases_both_keys() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        let store = CredentialStore::open(backend.clone(), StorageKeys::default());
        store.set(Credential::new("t1", Some(alice()))).unwrap();
        assert_eq!(backend.len(), 2);

        store.clear();
        store.clear();

        assert!(store.get().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_open_restores_persisted_pair() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        CredentialStore::open(backend.clone(), StorageKeys::default())
            .set(Credential::new("t1", Some(alice())))
            .unwrap();

        let reopened = CredentialStore::open(backend, StorageKeys::default());
        assert_eq!(reopened.get(), Some(Credential::new("t1", Some(alice()))));
    }

    #[test]
    fn test_open_erases_orphaned_principal() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        backend
            .set("auth_user", r#"{"username":"alice","roles":["ADMIN"]}"#)
            .unwrap();

        let store = CredentialStore::open(backend.clone(), StorageKeys::default());

        assert!(store.get().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_failed_principal_write_restores_previous_pair() {
        let backend = Arc::new(FailingKey {
            inner: InMemoryKeyValueStore::new(),
            failing: "auth_user",
        });
        let store = CredentialStore::open(backend.clone(), StorageKeys::default());

        let result = store.set(Credential::new("t1", Some(alice())));

        assert!(result.is_err());
        assert!(store.get().is_none());
        assert_eq!(backend.get("auth_token").unwrap(), None);
    }

    #[test]
    fn test_conditional_set_skipped_after_clear() {
        let store = CredentialStore::in_memory();
        store.set(Credential::new("t1", Some(alice()))).unwrap();
        let (_, generation) = store.snapshot();

        store.clear();
        let stored = store
            .set_if_generation(Credential::new("t2", None), generation)
            .unwrap();

        assert!(!stored);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_conditional_clear_keeps_newer_credential() {
        let store = CredentialStore::in_memory();
        store.set(Credential::new("t1", None)).unwrap();
        let generation = store.generation();

        store.set(Credential::new("t2", None)).unwrap();

        assert!(!store.clear_if_generation(generation));
        assert_eq!(store.token().as_deref(), Some("t2"));
        assert!(store.clear_if_generation(store.generation()));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_credential_without_principal_removes_principal_key() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        let store = CredentialStore::open(backend.clone(), StorageKeys::default());
        store.set(Credential::new("t1", Some(alice()))).unwrap();
        store.set(Credential::new("t2", None)).unwrap();

        assert_eq!(backend.get("auth_user").unwrap(), None);
        assert_eq!(backend.get("auth_token").unwrap().as_deref(), Some("t2"));
    }
}
