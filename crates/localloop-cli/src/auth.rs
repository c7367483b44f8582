//! Session token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock, PoisonError};

#[cfg(not(test))]
use keyring::Entry;

use localloop_core::storage::KeyValueStore;
use localloop_core::Result;
#[cfg(not(test))]
use localloop_core::Error;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "localloop-cli";

/// [`KeyValueStore`] over keychain entries scoped to one CLI profile.
///
/// Each key becomes its own entry, named `{profile}:{key}`.
#[derive(Clone)]
pub struct KeyringStore {
    profile_name: String,
}

impl KeyringStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            profile_name: profile_name.to_string(),
        }
    }

    fn account(&self, key: &str) -> String {
        format!("{}:{key}", self.profile_name)
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.account(key))
            .map_err(|error| Error::Storage(error.to_string()))
    }
}

impl KeyValueStore for KeyringStore {
    #[cfg(not(test))]
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(Error::Storage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = Self::test_store()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(&self.account(key)).cloned())
    }

    #[cfg(not(test))]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|error| Error::Storage(error.to_string()))
    }

    #[cfg(test)]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = Self::test_store()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(self.account(key), value.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(Error::Storage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn remove(&self, key: &str) -> Result<()> {
        let mut guard = Self::test_store()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(&self.account(key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use localloop_core::storage::{ACCESS_TOKEN_KEY, USERNAME_KEY};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn entries_are_scoped_per_profile() {
        let campus = KeyringStore::new("keyring-test-campus");
        let other = KeyringStore::new("keyring-test-other");

        campus.set(USERNAME_KEY, "alice").unwrap();
        assert_eq!(campus.get(USERNAME_KEY).unwrap().as_deref(), Some("alice"));
        assert_eq!(other.get(USERNAME_KEY).unwrap(), None);

        campus.set_or_remove(USERNAME_KEY, None).unwrap();
        assert_eq!(campus.get(USERNAME_KEY).unwrap(), None);
    }

    #[test]
    fn removing_a_missing_entry_is_ok() {
        let store = KeyringStore::new("keyring-test-empty");
        store.remove(ACCESS_TOKEN_KEY).unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }
}
