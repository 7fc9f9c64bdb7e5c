//! Persisted client preferences.
//!
//! The follow-market flag is read once when a session starts and written back
//! through [`FollowMarketSetting`] on toggle. Nothing reads it from ambient state.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "follow_market_default")]
    pub follow_market: bool,
}

const fn follow_market_default() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            follow_market: follow_market_default(),
        }
    }
}

/// Storage backend for [`Preferences`].
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Preferences, CoreError>;
    fn save(&self, preferences: &Preferences) -> Result<(), CoreError>;
}

/// JSON file store. A missing or unreadable file yields defaults.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Preferences, CoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Preferences::default()),
            Err(error) => return Err(error.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(preferences) => Ok(preferences),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "ignoring corrupt preference file");
                Ok(Preferences::default())
            }
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(preferences)?;
        fs::write(&self.path, body)?;
        Ok(())
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Mutex::new(preferences),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences, CoreError> {
        Ok(*self
            .inner
            .lock()
            .expect("preference lock is not poisoned"))
    }

    fn save(&self, preferences: &Preferences) -> Result<(), CoreError> {
        *self
            .inner
            .lock()
            .expect("preference lock is not poisoned") = *preferences;
        Ok(())
    }
}

/// Scoped handle over the follow-market flag.
#[derive(Clone)]
pub struct FollowMarketSetting {
    store: Arc<dyn PreferenceStore>,
    enabled: bool,
}

impl FollowMarketSetting {
    pub fn load(store: Arc<dyn PreferenceStore>) -> Result<Self, CoreError> {
        let enabled = store.load()?.follow_market;
        Ok(Self { store, enabled })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set(&mut self, enabled: bool) -> Result<(), CoreError> {
        let mut preferences = self.store.load()?;
        preferences.follow_market = enabled;
        self.store.save(&preferences)?;
        self.enabled = enabled;
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<bool, CoreError> {
        self.set(!self.enabled)?;
        Ok(self.enabled)
    }
}

impl std::fmt::Debug for FollowMarketSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowMarketSetting")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_follow() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePreferenceStore::new(dir.path().join("prefs.json"));
        assert_eq!(store.load().expect("load"), Preferences::default());
        assert!(Preferences::default().follow_market);
    }

    #[test]
    fn toggle_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("prefs.json");
        let store: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(&path));

        let mut setting = FollowMarketSetting::load(Arc::clone(&store)).expect("load");
        assert!(setting.enabled());
        assert!(!setting.toggle().expect("toggle"));

        let reloaded = FollowMarketSetting::load(store).expect("reload");
        assert!(!reloaded.enabled());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        fs::write(&path, b"{not json").expect("write");
        let store = FilePreferenceStore::new(path);
        assert_eq!(store.load().expect("load"), Preferences::default());
    }

    #[test]
    fn memory_store_round_trips_flag() {
        let store = MemoryPreferenceStore::default();
        store
            .save(&Preferences {
                follow_market: false,
            })
            .expect("save");
        assert!(!store.load().expect("load").follow_market);
    }
}
