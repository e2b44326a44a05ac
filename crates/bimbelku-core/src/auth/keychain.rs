use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::warn;

use super::persistence::{apply_changes, SessionPersistence};

const SERVICE_NAME: &str = "bimbelku";

/// Keychain account holding the session
const SESSION_ACCOUNT: &str = "session";

/// Session entries in the OS keychain, stored together as one JSON
/// credential so an update lands whole or not at all.
pub struct KeyringPersistence {
    service: String,
    lock: Mutex<()>,
}

impl KeyringPersistence {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            lock: Mutex::new(()),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, SESSION_ACCOUNT).context("Failed to create keyring entry")
    }

    fn load(&self, entry: &Entry) -> Result<BTreeMap<String, String>> {
        match entry.get_password() {
            Ok(value) => decode(&value),
            Err(keyring::Error::NoEntry) => Ok(BTreeMap::new()),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }
}

impl Default for KeyringPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPersistence for KeyringPersistence {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load(&self.entry()?)?.remove(key))
    }

    fn replace(&self, entries: &[(&str, &str)], keys: &[&str]) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = self.entry()?;

        let mut current = match self.load(&entry) {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Replacing unreadable keychain session");
                BTreeMap::new()
            }
        };
        apply_changes(&mut current, entries, keys);

        if current.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e).context("Failed to delete session from keychain"),
            };
        }
        entry
            .set_password(&encode(&current)?)
            .context("Failed to store session in keychain")
    }
}

fn encode(entries: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(entries).context("Failed to encode keychain session")
}

fn decode(value: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(value).context("Failed to parse keychain session")
}
