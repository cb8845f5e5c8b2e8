//! User domain module.
//!
//! # Module Structure
//!
//! - `model`: User profile domain model and creation seed

mod model;

pub use model::{ProfileSeed, UserProfile};
