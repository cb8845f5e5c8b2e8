//! Data transfer objects for backend rows.

mod profile;

pub use profile::{profile_from_record, profile_to_record, progression_patch, ProfileRecord};
