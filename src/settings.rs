//! Persisted user settings with backup and defaults fallback

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use validator::Validate;

use crate::models::Settings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings document: {0}")]
    Json(#[from] serde_json::Error),
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn parse_document(data: &str) -> Result<Settings, SettingsError> {
    let settings: Settings = serde_json::from_str(data)?;
    settings.validate()?;
    Ok(settings)
}

async fn read_document(path: &Path) -> Result<(Settings, String), SettingsError> {
    let data = tokio::fs::read_to_string(path).await?;
    let settings = parse_document(&data)?;
    Ok((settings, data))
}

/// Merge a partial document into the current one
///
/// `screensaver` is merged key by key and must be an object, every other top-level field is
/// replaced.
fn merge(current: &mut Value, patch: Value) -> Result<(), SettingsError> {
    let (current, patch) = match (current.as_object_mut(), patch) {
        (Some(current), Value::Object(patch)) => (current, patch),
        _ => {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "settings update must be a JSON object",
            )
            .into())
        }
    };

    for (key, value) in patch {
        if key == "screensaver" && !value.is_object() {
            let mut errors = validator::ValidationErrors::new();
            errors.add("screensaver", validator::ValidationError::new("object"));
            return Err(errors.into());
        }

        let replacement = match (current.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(fields)) if key == "screensaver" => {
                existing.extend(fields);
                None
            }
            (_, value) => Some(value),
        };

        if let Some(value) = replacement {
            current.insert(key, value);
        }
    }

    Ok(())
}

/// Settings document stored in a JSON file
///
/// Writes go through a `.temp` sibling and the previous valid document is kept as a `.backup`
/// sibling, which is used when the primary file cannot be read.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    state: Mutex<Settings>,
}

impl SettingsStore {
    /// Load the settings document, never failing
    ///
    /// Falls back to the backup copy, then to persisted defaults.
    #[instrument]
    pub async fn load(path: PathBuf) -> Self {
        let this = Self {
            state: Mutex::new(Settings::default()),
            path,
        };

        let settings = this.load_tiers().await;
        *this.state.lock().await = settings;
        this
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        sibling(&self.path, ".backup")
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, ".temp")
    }

    async fn load_tiers(&self) -> Settings {
        match read_document(&self.path).await {
            Ok((settings, data)) => {
                if let Err(error) = tokio::fs::write(self.backup_path(), data).await {
                    warn!(error = %error, "cannot write settings backup");
                }

                info!(path = %self.path.display(), "loaded settings");
                return settings;
            }
            Err(SettingsError::Io(error)) if error.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no settings file, using defaults");
                return self.persist_defaults().await;
            }
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "cannot load settings, trying backup");
            }
        }

        match read_document(&self.backup_path()).await {
            Ok((settings, data)) => {
                info!("restored settings from backup");

                if let Err(error) = tokio::fs::write(&self.path, data).await {
                    warn!(error = %error, "cannot restore settings file from backup");
                }

                settings
            }
            Err(error) => {
                warn!(error = %error, "cannot load settings backup, using defaults");
                self.persist_defaults().await
            }
        }
    }

    async fn persist_defaults(&self) -> Settings {
        let settings = Settings::default();

        if let Err(error) = self.persist(&settings).await {
            error!(error = %error, "cannot persist default settings");
        }

        settings
    }

    /// Write a document through the staging file
    async fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        let temp = self.temp_path();
        tokio::fs::write(&temp, serde_json::to_string_pretty(settings)?).await?;

        // Read back what was written before it replaces anything
        if let Err(error) = read_document(&temp).await {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(error);
        }

        // Only a valid primary is worth keeping as a backup
        if let Ok((_, data)) = read_document(&self.path).await {
            if let Err(error) = tokio::fs::write(self.backup_path(), data).await {
                warn!(error = %error, "cannot write settings backup");
            }
        }

        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    pub async fn get(&self) -> Settings {
        self.state.lock().await.clone()
    }

    /// Apply a partial document and persist the result
    ///
    /// Nothing changes, in memory or on disk, if the merged document is invalid or cannot be
    /// written.
    #[instrument(skip(self))]
    pub async fn update(&self, patch: Value) -> Result<Settings, SettingsError> {
        let mut state = self.state.lock().await;

        let mut document = serde_json::to_value(&*state)?;
        merge(&mut document, patch)?;

        let mut next: Settings = serde_json::from_value(document)?;
        next.validate()?;
        next.apply_link();
        next.system.last_updated = Utc::now();

        self.persist(&next).await?;
        *state = next.clone();

        debug!("updated settings");
        Ok(next)
    }

    /// Persist and return the default settings
    pub async fn reset(&self) -> Result<Settings, SettingsError> {
        let mut state = self.state.lock().await;
        let defaults = Settings::default();

        self.persist(&defaults).await?;
        *state = defaults.clone();

        info!("settings reset to defaults");
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(power: u32, mode: &str) -> String {
        json!({
            "screensaver": {
                "timeDelay": 1000,
                "mode": mode,
                "lightPower": power,
                "transitionSpeed": 500
            },
            "system": { "lastUpdated": "2024-01-01T00:00:00Z" },
            "lightPower": power,
            "linkLightPowers": false
        })
        .to_string()
    }

    #[tokio::test]
    async fn missing_file_persists_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let store = SettingsStore::load(path.clone()).await;

        assert_eq!(store.get().await.screensaver.mode, "dimToOn");
        let on_disk = tokio::fs::read_to_string(&path).await.expect("persisted");
        assert!(parse_document(&on_disk).is_ok());
    }

    #[tokio::test]
    async fn corrupt_primary_restores_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{ not json").await.expect("write");
        tokio::fs::write(sibling(&path, ".backup"), document(42, "disco"))
            .await
            .expect("write");

        let store = SettingsStore::load(path.clone()).await;
        let settings = store.get().await;

        assert_eq!(settings.light_power, 42);
        assert_eq!(settings.screensaver.mode, "disco");

        let restored = tokio::fs::read_to_string(&path).await.expect("read");
        assert_eq!(parse_document(&restored).expect("valid").light_power, 42);
    }

    #[tokio::test]
    async fn corrupt_primary_and_backup_use_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "[]").await.expect("write");
        tokio::fs::write(sibling(&path, ".backup"), r#"{"lightPower": 3}"#)
            .await
            .expect("write");

        let store = SettingsStore::load(path).await;
        let settings = store.get().await;

        assert_eq!(settings.light_power, 255);
        assert_eq!(settings.screensaver, Settings::default().screensaver);
    }

    #[tokio::test]
    async fn valid_primary_is_backed_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, document(12, "cycle")).await.expect("write");

        let _store = SettingsStore::load(path.clone()).await;

        let backup = tokio::fs::read_to_string(sibling(&path, ".backup"))
            .await
            .expect("backup written");
        assert_eq!(parse_document(&backup).expect("valid").light_power, 12);
    }

    #[tokio::test]
    async fn update_deep_merges_screensaver() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, document(100, "cycle")).await.expect("write");
        let store = SettingsStore::load(path.clone()).await;
        let before = store.get().await;

        let updated = store
            .update(json!({ "screensaver": { "mode": "pulsate" }, "lightPower": 90 }))
            .await
            .expect("update");

        assert_eq!(updated, store.get().await);
        assert_eq!(updated.screensaver.mode, "pulsate");
        assert_eq!(updated.screensaver.time_delay, 1000);
        assert_eq!(updated.screensaver.light_power, 100);
        assert_eq!(updated.light_power, 90);
        assert!(updated.system.last_updated > before.system.last_updated);

        let on_disk = tokio::fs::read_to_string(&path).await.expect("read");
        assert_eq!(parse_document(&on_disk).expect("valid"), updated);
        assert!(!sibling(&path, ".temp").exists());
    }

    #[tokio::test]
    async fn update_applies_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::load(dir.path().join("settings.json")).await;

        let updated = store
            .update(json!({ "lightPower": 64, "linkLightPowers": true }))
            .await
            .expect("update");

        assert_eq!(updated.screensaver_power(), 64);
    }

    #[tokio::test]
    async fn invalid_update_changes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, document(100, "cycle")).await.expect("write");
        let store = SettingsStore::load(path.clone()).await;
        let before = store.get().await;
        let disk_before = tokio::fs::read_to_string(&path).await.expect("read");

        let out_of_range = store
            .update(json!({ "screensaver": { "lightPower": 300 } }))
            .await;
        assert!(matches!(out_of_range, Err(SettingsError::Validation(_))));

        let no_screensaver = store.update(json!({ "screensaver": null })).await;
        assert!(matches!(no_screensaver, Err(SettingsError::Validation(_))));

        let screensaver_number = store.update(json!({ "screensaver": 5 })).await;
        assert!(matches!(screensaver_number, Err(SettingsError::Validation(_))));

        let not_object = store.update(json!([1, 2])).await;
        assert!(matches!(not_object, Err(SettingsError::Json(_))));

        assert_eq!(store.get().await, before);
        assert_eq!(tokio::fs::read_to_string(&path).await.expect("read"), disk_before);
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, document(5, "disco")).await.expect("write");
        let store = SettingsStore::load(path).await;

        let settings = store.reset().await.expect("reset");

        assert_eq!(settings.light_power, 255);
        assert_eq!(store.get().await.screensaver.mode, "dimToOn");
    }
}
