//! Progression (XP) domain module.
//!
//! # Module Structure
//!
//! - `table`: Tier table mapping score to level and title
//! - `event`: Score increments and their outcomes

mod event;
mod table;

pub use event::{ProgressionEvent, ProgressionOutcome, ProgressionSnapshot};
pub use table::{ProgressionTable, ProgressionTier, INITIAL_TITLE};
