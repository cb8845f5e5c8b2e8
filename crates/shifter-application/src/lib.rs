//! Application layer of the Sacred Shifter state layer.
//!
//! The three stores UI code talks to, plus the tracing layer that carries
//! their analytics events out of the process.

pub mod analytics;
pub mod energy;
pub mod progression;
pub mod session;

#[cfg(test)]
mod test_support;

pub use analytics::{AnalyticsEvent, AnalyticsLayer, ANALYTICS_TARGET};
pub use energy::EnergyStore;
pub use progression::{ProgressionStore, ProgressionUpdates};
pub use session::SessionStore;
