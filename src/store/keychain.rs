use super::session::KEY_TOKEN;
use super::{KeyValueStore, StoreError};
use std::sync::{Arc, Mutex, MutexGuard};

pub const KEYRING_SERVICE: &str = "com.softaworks.smokefree";

/// Keeps the bearer token in the OS keyring and every other key in `inner`.
///
/// When the keyring cannot be reached the token lives in memory only, so it
/// never lands in the plain session file.
pub struct KeychainStore {
    entry: Option<keyring::Entry>,
    token: Mutex<Option<String>>,
    inner: Arc<dyn KeyValueStore>,
}

fn entry_is_usable(entry: &keyring::Entry) -> bool {
    match entry.get_password() {
        Ok(_) => true,
        Err(keyring::Error::NoEntry) => true,
        Err(keyring::Error::BadEncoding(_)) => true,
        Err(keyring::Error::Ambiguous(_)) => true,
        Err(keyring::Error::NoStorageAccess(_)) => false,
        Err(keyring::Error::PlatformFailure(_)) => false,
        Err(_) => false,
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl KeychainStore {
    /// Opens the keyring entry for `service`. A token left in `inner` by an
    /// older build is moved into the keyring.
    pub fn new(service: &str, inner: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let entry = match keyring::Entry::new(service, KEY_TOKEN) {
            Ok(entry) if entry_is_usable(&entry) => Some(entry),
            Ok(_) => {
                tracing::warn!("keyring unavailable; token will not survive a restart");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "keyring unavailable; token will not survive a restart");
                None
            }
        };
        Self::from_parts(entry, inner)
    }

    pub fn with_entry(entry: keyring::Entry, inner: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Self::from_parts(Some(entry), inner)
    }

    /// Token kept for the life of the process only.
    pub fn memory_only(inner: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Self::from_parts(None, inner)
    }

    fn from_parts(entry: Option<keyring::Entry>, inner: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let store = Self {
            entry,
            token: Mutex::new(None),
            inner,
        };
        if let Some(legacy) = store.inner.get(KEY_TOKEN) {
            store.set(KEY_TOKEN, legacy)?;
            store.inner.remove(KEY_TOKEN)?;
            tracing::info!("moved persisted token into the keyring");
        }
        Ok(store)
    }

    pub fn is_persistent(&self) -> bool {
        self.entry.is_some()
    }

    fn cached(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_token(&self) -> Option<String> {
        if let Some(token) = self.cached().clone() {
            return Some(token);
        }
        let entry = self.entry.as_ref()?;
        match entry.get_password() {
            Ok(pwd) => {
                let token = non_blank(&pwd)?;
                *self.cached() = Some(token.clone());
                Some(token)
            }
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read token from keyring");
                None
            }
        }
    }

    fn set_token(&self, value: String) -> Result<(), StoreError> {
        if let Some(entry) = &self.entry {
            entry.set_password(&value)?;
        }
        *self.cached() = non_blank(&value);
        Ok(())
    }

    fn remove_token(&self) -> Result<bool, StoreError> {
        let had_cached = self.cached().take().is_some();
        let Some(entry) = &self.entry else {
            return Ok(had_cached);
        };
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(had_cached),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for KeychainStore {
    fn get(&self, key: &str) -> Option<String> {
        if key == KEY_TOKEN {
            return self.get_token();
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if key == KEY_TOKEN {
            return self.set_token(value);
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        if key == KEY_TOKEN {
            return self.remove_token();
        }
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore, KEY_USER};
    use keyring::mock::MockCredential;

    fn mock_entry() -> keyring::Entry {
        keyring::Entry::new_with_credential(Box::new(MockCredential::default()))
    }

    #[test]
    fn token_goes_to_keyring_and_never_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let files = Arc::new(FileStore::open(&path).unwrap());
        let store = KeychainStore::with_entry(mock_entry(), files.clone()).unwrap();

        store.set(KEY_TOKEN, "secret-abc".to_string()).unwrap();
        store.set(KEY_USER, r#"{"id":"1"}"#.to_string()).unwrap();

        assert!(store.is_persistent());
        assert_eq!(store.get(KEY_TOKEN).as_deref(), Some("secret-abc"));
        assert_eq!(files.get(KEY_TOKEN), None);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("secret-abc"));
        assert!(on_disk.contains("user"));
    }

    #[test]
    fn token_is_read_back_from_keyring_after_cache_is_cold() {
        let entry = mock_entry();
        entry.set_password("from-keyring").unwrap();
        let store = KeychainStore::with_entry(entry, Arc::new(MemoryStore::new())).unwrap();

        assert_eq!(store.get(KEY_TOKEN).as_deref(), Some("from-keyring"));
    }

    #[test]
    fn remove_token_reports_presence() {
        let store = KeychainStore::with_entry(mock_entry(), Arc::new(MemoryStore::new())).unwrap();
        store.set(KEY_TOKEN, "abc".to_string()).unwrap();

        assert!(store.remove(KEY_TOKEN).unwrap());
        assert!(!store.remove(KEY_TOKEN).unwrap());
        assert_eq!(store.get(KEY_TOKEN), None);
    }

    #[test]
    fn legacy_file_token_is_moved_out_of_the_file() {
        let inner = Arc::new(MemoryStore::new());
        inner.set(KEY_TOKEN, "old".to_string()).unwrap();

        let store = KeychainStore::with_entry(mock_entry(), inner.clone()).unwrap();

        assert_eq!(inner.get(KEY_TOKEN), None);
        assert_eq!(store.get(KEY_TOKEN).as_deref(), Some("old"));
    }

    #[test]
    fn memory_only_keeps_token_out_of_inner_store() {
        let inner = Arc::new(MemoryStore::new());
        let store = KeychainStore::memory_only(inner.clone()).unwrap();

        store.set(KEY_TOKEN, "abc".to_string()).unwrap();

        assert!(!store.is_persistent());
        assert_eq!(store.get(KEY_TOKEN).as_deref(), Some("abc"));
        assert_eq!(inner.get(KEY_TOKEN), None);
        assert!(store.remove(KEY_TOKEN).unwrap());
        assert!(!store.remove(KEY_TOKEN).unwrap());
    }
}
