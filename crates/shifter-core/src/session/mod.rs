//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Session snapshot and status lifecycle

mod model;

pub use model::{Session, SessionStatus};
