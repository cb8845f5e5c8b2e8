//! Domain layer of the Sacred Shifter state layer.
//!
//! Models, error taxonomy and backend ports shared by the infrastructure
//! adapters and the application stores. Nothing in this crate performs I/O.

pub mod backend;
pub mod config;
pub mod energy;
pub mod error;
pub mod progression;
pub mod session;
pub mod user;

// Re-export common error type
pub use error::{AuthError, Result, ShifterError, StorageError};
