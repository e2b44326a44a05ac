//! Storage port for the three session entries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Durable string key/value storage for the session entries.
///
/// Calls are synchronous; the credential store keeps the authoritative copy
/// in memory and only writes through.
pub trait SessionPersistence: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Set `entries` and remove `keys` as one unit: after an error none of
    /// the changes are visible. Missing keys are not an error.
    fn replace(&self, entries: &[(&str, &str)], keys: &[&str]) -> Result<()>;

    fn write(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.replace(entries, &[])
    }

    fn clear(&self, keys: &[&str]) -> Result<()> {
        self.replace(&[], keys)
    }
}

/// Apply one `replace` to an in-memory copy of the entries.
pub(crate) fn apply_changes(
    map: &mut BTreeMap<String, String>,
    entries: &[(&str, &str)],
    keys: &[&str],
) {
    for key in keys {
        map.remove(*key);
    }
    for (key, value) in entries {
        map.insert(key.to_string(), value.to_string());
    }
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything currently stored.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionPersistence for MemoryPersistence {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn replace(&self, new_entries: &[(&str, &str)], keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        apply_changes(&mut *entries, new_entries, keys);
        Ok(())
    }
}

/// All entries in one JSON file, replaced atomically on every write.
pub struct FilePersistence {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePersistence {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl SessionPersistence for FilePersistence {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn replace(&self, new_entries: &[(&str, &str)], keys: &[&str]) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        // An unreadable file is replaced rather than blocking new sessions
        let mut entries = self.load().unwrap_or_default();
        apply_changes(&mut entries, new_entries, keys);
        self.save(&entries)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict session file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
