use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.json";

/// The persisted document. Only the manager password lives here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_password: Option<String>,
}

impl Config {
    /// The configured password, with blank values treated as unset.
    pub fn password(&self) -> Option<&str> {
        self.manager_password
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to persist config at {}: {source}", .path.display())]
pub struct StorageError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Loads and saves `config.json` under the application data directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted document. A missing or unreadable file yields the
    /// empty default; first boot has no config.
    pub async fn load(&self) -> Config {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file yet");
                return Config::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read config, using defaults");
                return Config::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config is not valid JSON, using defaults");
                Config::default()
            }
        }
    }

    /// Overwrite the whole document. Callers pass the complete desired state.
    pub async fn save(&self, config: &Config) -> Result<(), StorageError> {
        let err = |source: std::io::Error| StorageError {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await.map_err(err)?;
        }

        let body = serde_json::to_string_pretty(config)
            .map_err(|e| err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        // Write beside the target and rename, so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await.map_err(err)?;
        fs::rename(&tmp, &self.path).await.map_err(err)?;
        debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}
