//! Backend adapters.
//!
//! # Module Structure
//!
//! - `memory`: Process-local implementation of all three capabilities
//! - `rest`: HTTP client for a hosted platform
//! - `session_file`: On-disk persistence of the signed-in session

mod memory;
mod rest;
mod session_file;

pub use memory::{InMemoryAuthService, InMemoryBackend, InMemoryObjectStorage, InMemoryRowStorage};
pub use rest::RestBackend;
pub use session_file::SessionFile;

use shifter_core::backend::{AuthService, ObjectStorage, RowStorage};
use shifter_core::config::{BackendKind, BackendSettings};
use shifter_core::Result;
use std::sync::Arc;

/// The three backend capabilities behind trait objects.
#[derive(Clone)]
pub struct BackendHandles {
    pub auth: Arc<dyn AuthService>,
    pub rows: Arc<dyn RowStorage>,
    pub objects: Arc<dyn ObjectStorage>,
}

impl From<&InMemoryBackend> for BackendHandles {
    fn from(backend: &InMemoryBackend) -> Self {
        Self {
            auth: backend.auth(),
            rows: backend.rows(),
            objects: backend.objects(),
        }
    }
}

impl From<Arc<RestBackend>> for BackendHandles {
    fn from(backend: Arc<RestBackend>) -> Self {
        Self {
            auth: backend.clone(),
            rows: backend.clone(),
            objects: backend,
        }
    }
}

/// Builds the backend selected by `[backend] kind`.
pub fn connect(settings: &BackendSettings) -> Result<BackendHandles> {
    match settings.kind {
        BackendKind::Memory => {
            tracing::info!("Using in-memory backend");
            Ok(BackendHandles::from(&InMemoryBackend::new()))
        }
        BackendKind::Rest => {
            let backend = RestBackend::from_settings(settings)?;
            tracing::info!(url = settings.url.as_deref().unwrap_or_default(), "Using REST backend");
            Ok(BackendHandles::from(Arc::new(backend)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let handles = connect(&BackendSettings::default()).unwrap();
        assert!(handles.auth.current_session().await.unwrap().is_none());
    }

    #[test]
    fn test_connect_rest_requires_url() {
        let settings = BackendSettings {
            kind: BackendKind::Rest,
            ..BackendSettings::default()
        };
        assert!(connect(&settings).is_err());
    }
}
