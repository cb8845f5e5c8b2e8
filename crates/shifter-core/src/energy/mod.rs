//! Energy focus domain module.
//!
//! # Module Structure
//!
//! - `model`: Energy types, the canonical attribute table, and the state snapshot

mod model;

pub use model::{clamp_intensity, EnergyState, EnergyType};
