// # JSON Settings Store
//
// Writes runtime-learned values (the zone id) and normalized defaults back
// into the settings file. The file holds the API token, so it is always
// rewritten with mode 0600.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::Error;
use crate::config::Settings;
use crate::traits::SettingsStore;

/// Settings file handle owning the in-memory copy it writes back
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    settings: Mutex<Settings>,
}

impl JsonSettingsStore {
    /// Wrap already-loaded settings that came from `path`
    pub fn new<P: AsRef<Path>>(path: P, settings: Settings) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            settings: Mutex::new(settings),
        }
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current settings
    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    /// Rewrite the file from the in-memory copy
    pub async fn persist(&self) -> Result<(), Error> {
        let settings = self.settings.lock().await;
        write_settings(&self.path, &settings).await
    }
}

async fn write_settings(path: &Path, settings: &Settings) -> Result<(), Error> {
    let json = settings.to_json_pretty()?;
    super::write_atomic(path, json.as_bytes(), 0o600).await?;
    tracing::debug!("Settings written to {}", path.display());
    Ok(())
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn save_zone_id(&self, zone_id: &str) -> Result<(), Error> {
        let mut settings = self.settings.lock().await;
        settings.provider_options.zone_id = zone_id.to_string();
        write_settings(&self.path, &settings).await
    }
}
