//! Per-user state: the data directory layout and a namespaced key/value
//! settings store for the credential. Passed explicitly to whoever needs it
//! instead of living in process-wide globals.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

pub const SETTINGS_NAMESPACE: &str = "Malcore";
pub const API_KEY_SETTING: &str = "ApiKey";

pub trait CredentialStore {
    fn get(&self, namespace: &str, key: &str) -> Option<String>;
    fn set(&mut self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Directory holding settings and cached reports, `~/.malq` by default.
#[derive(Clone, Debug)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_location() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".malq"))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("reports")
    }
}

/// JSON-file settings, read once at startup and rewritten on every `set`.
pub struct SettingsFile {
    path: PathBuf,
    values: HashMap<String, HashMap<String, String>>,
}

#[derive(Default, Serialize, Deserialize)]
struct SettingsDoc {
    #[serde(flatten)]
    namespaces: HashMap<String, HashMap<String, String>>,
}

impl SettingsFile {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<SettingsDoc>(&bytes) {
                Ok(doc) => doc.namespaces,
                Err(err) => {
                    warn!("[settings] ignoring malformed {}: {}", path.display(), err);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, values }
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = SettingsDoc {
            namespaces: self.values.clone(),
        };
        fs::write(&self.path, serde_json::to_vec_pretty(&doc)?)?;
        Ok(())
    }
}

impl CredentialStore for SettingsFile {
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.values.get(namespace)?.get(key).cloned()
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.persist()
    }
}

pub fn stored_api_key(store: &impl CredentialStore) -> Option<String> {
    store.get(SETTINGS_NAMESPACE, API_KEY_SETTING)
}

pub fn store_api_key(store: &mut impl CredentialStore, key: &str) -> anyhow::Result<()> {
    store.set(SETTINGS_NAMESPACE, API_KEY_SETTING, key)
}

/// In-memory store for tests and one-off runs.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<(String, String), String>,
}

impl CredentialStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.values
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn scratch(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("malq-session-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn settings_roundtrip() {
        let path = scratch("roundtrip").join("settings.json");
        let _ = fs::remove_file(&path);

        let mut settings = SettingsFile::load(&path);
        assert_eq!(stored_api_key(&settings), None);
        store_api_key(&mut settings, "k-123").unwrap();

        // fresh load sees the persisted key
        let reloaded = SettingsFile::load(&path);
        assert_eq!(stored_api_key(&reloaded), Some("k-123".to_string()));
    }

    #[test]
    fn malformed_settings_start_empty() {
        let path = scratch("malformed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();
        let settings = SettingsFile::load(&path);
        assert_eq!(stored_api_key(&settings), None);
    }

    #[test]
    fn data_dir_layout() {
        let dir = DataDir::new("/tmp/malq-root");
        assert_eq!(dir.settings_path(), Path::new("/tmp/malq-root/settings.json"));
        assert_eq!(dir.cache_dir(), Path::new("/tmp/malq-root/reports"));
    }
}
