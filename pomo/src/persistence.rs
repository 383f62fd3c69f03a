//! Durable key-value storage for settings and the planned schedule.
//!
//! Loads never fail the caller: missing or corrupt values fall back to
//! defaults and the problem is logged.

use crate::schedule::PlannedEntry;
use crate::settings::Settings;
use directories::ProjectDirs;
use pomo_ipc::SettingsPatch;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

pub const SETTINGS_KEY: &str = "settings";
pub const SCHEDULE_KEY: &str = "planned_schedule";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not determine data directory")]
    NoDataDir,
}

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory.
    pub fn in_data_dir() -> Result<Self, StoreError> {
        Ok(Self::new(default_data_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

pub fn default_data_dir() -> Result<PathBuf, StoreError> {
    let proj_dirs = ProjectDirs::from("com", "pomo", "pomo").ok_or(StoreError::NoDataDir)?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// In-memory store. Clones share the same map, so a test can keep one
/// handle and give the other away.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn with(key: &str, value: &str) -> Self {
        let store = Self::default();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned()))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Stored fields merged over defaults one by one, clamped into range. A
/// field that fails to parse keeps its default without affecting the rest.
pub fn load_settings(store: &dyn KeyValueStore) -> Settings {
    let raw = match store.get(SETTINGS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Settings::default(),
        Err(e) => {
            warn!("Failed to read settings: {}", e);
            return Settings::default();
        }
    };
    let fields = match serde_json::from_str::<Map<String, Value>>(&raw) {
        Ok(fields) => fields,
        Err(e) => {
            warn!("Stored settings are corrupt, using defaults: {}", e);
            return Settings::default();
        }
    };
    let patch = SettingsPatch {
        work_duration: stored_field(&fields, "workDuration"),
        break_duration: stored_field(&fields, "breakDuration"),
        auto_repeat: stored_field(&fields, "autoRepeat"),
        volume: stored_field(&fields, "volume"),
    };
    Settings::default().merged(&patch)
}

fn stored_field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.get(key)?;
    match T::deserialize(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(field = key, "Ignoring stored setting: {}", e);
            None
        }
    }
}

pub fn save_settings(store: &mut dyn KeyValueStore, settings: &Settings) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(settings)?;
    store.set(SETTINGS_KEY, &json)
}

pub fn load_schedule(store: &dyn KeyValueStore) -> Vec<PlannedEntry> {
    let raw = match store.get(SCHEDULE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!("Failed to read planned schedule: {}", e);
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Stored planned schedule is corrupt, starting empty: {}", e);
        Vec::new()
    })
}

pub fn save_schedule(
    store: &mut dyn KeyValueStore,
    entries: &[PlannedEntry],
) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(entries)?;
    store.set(SCHEDULE_KEY, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTime;

    fn sample_entry() -> PlannedEntry {
        PlannedEntry {
            id: "1".to_string(),
            name: "Deep work".to_string(),
            start_time: ClockTime::parse("09:00"),
            work_end_time: ClockTime::parse("09:25"),
            break_end_time: ClockTime::parse("09:30"),
        }
    }

    #[test]
    fn missing_keys_load_defaults() {
        let store = MemoryStore::default();
        assert_eq!(load_settings(&store), Settings::default());
        assert!(load_schedule(&store).is_empty());
    }

    #[test]
    fn corrupt_values_load_defaults() {
        let store = MemoryStore::with(SETTINGS_KEY, "{not json");
        assert_eq!(load_settings(&store), Settings::default());

        let store = MemoryStore::with(SCHEDULE_KEY, r#"{"id": 3}"#);
        assert!(load_schedule(&store).is_empty());
    }

    #[test]
    fn partial_settings_merge_over_defaults() {
        let store = MemoryStore::with(SETTINGS_KEY, r#"{"breakDuration": 10, "volume": 7}"#);
        let settings = load_settings(&store);
        assert_eq!(settings.break_duration, 10);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.work_duration, 25);
        assert!(settings.auto_repeat);
    }

    #[test]
    fn one_bad_field_keeps_the_others() {
        let store = MemoryStore::with(
            SETTINGS_KEY,
            r#"{"workDuration": 45, "breakDuration": 10, "volume": "loud", "autoRepeat": null}"#,
        );
        let settings = load_settings(&store);
        assert_eq!(settings.work_duration, 45);
        assert_eq!(settings.break_duration, 10);
        assert_eq!(settings.volume, 0.5);
        assert!(settings.auto_repeat);

        let store = MemoryStore::with(SETTINGS_KEY, r#"{"workDuration": -3, "breakDuration": 99}"#);
        let settings = load_settings(&store);
        assert_eq!(settings.work_duration, 25);
        assert_eq!(settings.break_duration, 15);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        let settings = Settings {
            work_duration: 45,
            break_duration: 10,
            auto_repeat: false,
            volume: 0.3,
        };

        let mut store = JsonFileStore::new(&data_dir);
        save_settings(&mut store, &settings).unwrap();
        save_schedule(&mut store, &[sample_entry()]).unwrap();
        assert!(data_dir.join("settings.json").exists());
        assert!(data_dir.join("planned_schedule.json").exists());

        let reopened = JsonFileStore::new(&data_dir);
        assert_eq!(load_settings(&reopened), settings);
        assert_eq!(load_schedule(&reopened), vec![sample_entry()]);
    }

    #[test]
    fn file_store_missing_dir_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent"));
        assert_eq!(store.get(SETTINGS_KEY).unwrap(), None);
    }
}
