//! Infrastructure layer: backend adapters, configuration loading and row DTOs.

pub mod backend;
pub mod config_service;
pub mod dto;
pub mod paths;

pub use crate::backend::{connect, BackendHandles, InMemoryBackend, RestBackend};
pub use crate::config_service::ConfigService;
pub use crate::paths::ShifterPaths;
