//! CLI configuration management.
//!
//! The config names the manifest file, the on-disk store and the engine
//! settings (origin, core set, cache names). It is stored at
//! `~/.config/shellcache/config.json` unless `--config` points elsewhere.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellcache_core::{EngineConfig, ResourceManifest};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON file mapping resource keys to content hashes
    pub manifest_path: Option<PathBuf>,
    /// Root of the on-disk blob store
    pub cache_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Load from `path`, or the default location. A missing file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn load_manifest(&self) -> Result<ResourceManifest> {
        let path = self
            .manifest_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No manifest configured; run `shellcache init` first"))?;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        ResourceManifest::from_json(&contents)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempdir().unwrap();
        let config = Config::load(Some(&temp.path().join("absent.json"))).unwrap();
        assert!(config.manifest_path.is_none());
        assert!(config.engine.skip_waiting_on_install);
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.manifest_path = Some(temp.path().join("manifest.json"));
        config.cache_dir = Some(temp.path().join("store"));
        config.engine.origin = "https://app.example.com".to_string();

        let written = config.save(Some(&path)).unwrap();
        assert_eq!(written, path);

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.manifest_path, config.manifest_path);
        assert_eq!(loaded.cache_dir().unwrap(), temp.path().join("store"));
        assert_eq!(loaded.engine, config.engine);
    }

    #[test]
    fn test_load_manifest() {
        let temp = tempdir().unwrap();
        let manifest_path = temp.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"/": "a", "index.html": "a"}"#).unwrap();

        let config = Config {
            manifest_path: Some(manifest_path),
            ..Config::default()
        };
        assert_eq!(config.load_manifest().unwrap().len(), 2);

        assert!(Config::default().load_manifest().is_err());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
