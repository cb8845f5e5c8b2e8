//! JSON file holding the signed-in session between runs.

use shifter_core::backend::SessionToken;
use shifter_core::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session. A missing or unreadable file yields `None`;
    /// an unreadable one is logged and left for the next `store` to replace.
    pub async fn load(&self) -> Option<SessionToken> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                None
            }
        }
    }

    pub async fn store(&self, token: &SessionToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, permissions).await?;
        }

        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shifter_core::backend::AuthUser;

    fn token() -> SessionToken {
        SessionToken {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            user: AuthUser {
                id: "u1".into(),
                email: "a@b.com".into(),
                metadata: Default::default(),
            },
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().join("session.json"));

        let token = token();
        assert!(file.load().await.is_none());
        file.store(&token).await.unwrap();
        assert_eq!(file.load().await, Some(token));
        file.clear().await.unwrap();
        assert!(file.load().await.is_none());
        file.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(SessionFile::new(path).load().await.is_none());
    }
}
