//! Path management for Sacred Shifter configuration files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/sacred-shifter/     # Config directory (platform config dir)
//! ├── config.toml               # Application configuration
//! └── session.json              # Persisted sign-in (rest backend only)
//! ```
//!
//! `$SHIFTER_CONFIG` points at an alternative `config.toml`.

use std::path::{Path, PathBuf};

/// Directory name under the platform config directory.
pub const APP_DIR: &str = "sacred-shifter";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "SHIFTER_CONFIG";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for shifter_core::ShifterError {
    fn from(err: PathError) -> Self {
        shifter_core::ShifterError::config(err.to_string())
    }
}

/// Resolves where configuration and session files live.
///
/// With a base directory every path is placed under it; otherwise the
/// platform config directory plus [`APP_DIR`] is used.
#[derive(Debug, Clone, Default)]
pub struct ShifterPaths {
    base: Option<PathBuf>,
}

impl ShifterPaths {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(PathError::ConfigDirNotFound),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    pub fn session_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("session.json"))
    }

    /// Picks the config file: explicit path, then `$SHIFTER_CONFIG`, then
    /// the default location.
    pub fn resolve_config_file(&self, explicit: Option<&Path>) -> Result<PathBuf, PathError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        self.config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_base() {
        let paths = ShifterPaths::new(Some(PathBuf::from("/tmp/shifter-test")));
        assert_eq!(paths.config_dir().unwrap(), PathBuf::from("/tmp/shifter-test"));
        assert!(paths.config_file().unwrap().ends_with("config.toml"));
        assert!(paths.session_file().unwrap().ends_with("session.json"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let paths = ShifterPaths::new(Some(PathBuf::from("/tmp/shifter-test")));
        let explicit = Path::new("/etc/shifter.toml");
        assert_eq!(
            paths.resolve_config_file(Some(explicit)).unwrap(),
            PathBuf::from("/etc/shifter.toml")
        );
    }
}
