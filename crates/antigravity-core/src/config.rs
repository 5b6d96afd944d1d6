//! Atomic JSON persistence for the top-level application configuration.
//!
//! Grounded in the teacher's `modules/config.rs` load/save/update trio and
//! its temp-file-then-rename discipline, reused verbatim here for
//! [`AppConfig`] instead of the teacher's own config shape.

use std::path::PathBuf;

use antigravity_types::models::AppConfig;
use tokio::sync::Mutex;
use validator::Validate;

use crate::error::{DispatchError, DispatchResult};

/// Owns the on-disk application configuration, serialising every write
/// behind a single mutex.
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<AppConfig>,
}

impl ConfigStore {
    /// Load `path`, writing out a default configuration if it doesn't exist.
    pub async fn load(path: PathBuf) -> DispatchResult<Self> {
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(err) => return Err(err.into()),
        };
        let store = Self { path, inner: Mutex::new(config) };
        if !store.path.exists() {
            store.persist(&store.inner.lock().await).await?;
        }
        Ok(store)
    }

    /// A clone of the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.inner.lock().await.clone()
    }

    /// Apply `updater` to the in-memory config, validate it, persist it, and
    /// return the updated value. Rejects the change (leaving the in-memory
    /// and on-disk copies untouched) if validation fails.
    pub async fn update<F>(&self, updater: F) -> DispatchResult<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.inner.lock().await;
        let mut candidate = config.clone();
        updater(&mut candidate);
        candidate
            .proxy
            .validate()
            .map_err(|err| DispatchError::InvalidRequest(format!("invalid config: {err}")))?;
        self.persist(&candidate).await?;
        *config = candidate.clone();
        Ok(candidate)
    }

    async fn persist(&self, config: &AppConfig) -> DispatchResult<()> {
        let serialized = serde_json::to_string_pretty(config)?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_file_writes_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::load(path.clone()).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.get().await.version, 1);
    }

    #[tokio::test]
    async fn update_persists_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::load(path.clone()).await.unwrap();
        store
            .update(|config| {
                config.proxy.enabled = true;
                config.proxy.port = 9090;
                config.proxy.api_key = "secret".to_string();
            })
            .await
            .unwrap();

        let reloaded = ConfigStore::load(path).await.unwrap();
        let config = reloaded.get().await;
        assert!(config.proxy.enabled);
        assert_eq!(config.proxy.port, 9090);
    }

    #[tokio::test]
    async fn update_rejects_invalid_port_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::load(path).await.unwrap();
        let result = store
            .update(|config| {
                config.proxy.port = 80;
                config.proxy.api_key = "secret".to_string();
            })
            .await;
        assert!(result.is_err());
        assert!(!store.get().await.proxy.enabled);
    }
}
