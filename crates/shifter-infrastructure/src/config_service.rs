//! Configuration service implementation.
//!
//! Loads [`ShifterConfig`] from `config.toml`, writing a default file the
//! first time so users have something to edit.

use shifter_core::config::ShifterConfig;
use shifter_core::{Result, ShifterError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::paths::ShifterPaths;

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<ShifterConfig>>>,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Uses `explicit`, `$SHIFTER_CONFIG` or the platform default, in that order.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let path = ShifterPaths::default().resolve_config_file(explicit)?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the configuration, loading it from file if not cached.
    pub fn get_config(&self) -> Result<ShifterConfig> {
        {
            let cached = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ref config) = *cached {
                return Ok(config.clone());
            }
        }

        let loaded = self.load_config()?;

        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(loaded.clone());

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
    }

    fn load_config(&self) -> Result<ShifterConfig> {
        if !self.path.exists() {
            let default_config = ShifterConfig::default();
            self.write_config(&default_config)?;
            tracing::info!(path = %self.path.display(), "Created default config");
            return Ok(default_config);
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let config: ShifterConfig = toml::from_str(&raw).map_err(|e| {
            ShifterError::config(format!("{}: {}", self.path.display(), e.message()))
        })?;
        tracing::debug!(path = %self.path.display(), "Loaded config");
        Ok(config)
    }

    fn write_config(&self, config: &ShifterConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shifter_core::energy::EnergyType;

    #[test]
    fn test_creates_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let service = ConfigService::new(&path);

        let config = service.get_config().unwrap();

        assert_eq!(config, ShifterConfig::default());
        assert!(path.exists());
        let reparsed: ShifterConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[energy]\ndefault_type = \"Root\"\n").unwrap();

        let config = ConfigService::new(&path).get_config().unwrap();

        assert_eq!(config.energy.default_type, EnergyType::Root);
    }

    #[test]
    fn test_cache_and_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();
        let service = ConfigService::new(&path);
        assert_eq!(service.get_config().unwrap().logging.level, "warn");

        std::fs::write(&path, "[logging]\nlevel = \"trace\"\n").unwrap();
        assert_eq!(service.get_config().unwrap().logging.level, "warn");

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().logging.level, "trace");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[energy]\ndefault_type = \"Spleen\"\n").unwrap();

        let err = ConfigService::new(&path).get_config().unwrap_err();

        assert!(matches!(err, ShifterError::Config(_)));
    }

    #[test]
    fn test_bad_tier_table_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[[progression.tiers]]\nmin_score = 0\nlevel = 0\ntitle = \"Seeker\"\n\n\
             [[progression.tiers]]\nmin_score = 0\nlevel = 1\ntitle = \"Twin\"\n",
        )
        .unwrap();

        let err = ConfigService::new(&path).get_config().unwrap_err();

        assert!(matches!(err, ShifterError::Config(ref msg) if msg.contains("strictly increase")));
    }
}
