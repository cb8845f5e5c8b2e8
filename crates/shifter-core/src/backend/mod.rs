//! Backend service ports.
//!
//! The state layer talks to one external collaborator, a hosted
//! auth + row storage + object storage platform. Each capability is a trait
//! here; adapters live in `shifter-infrastructure`.
//!
//! # Module Structure
//!
//! - `auth`: Sign-in/sign-up/session lifecycle (`AuthService`)
//! - `rows`: Keyed row access (`RowStorage`)
//! - `objects`: Blob upload and signed URLs (`ObjectStorage`)

mod auth;
mod objects;
mod rows;

pub use auth::{AuthChange, AuthService, AuthUser, SessionToken, DISPLAY_NAME_KEY};
pub use objects::ObjectStorage;
pub use rows::{record_id, Record, RowStorage, ID_COLUMN};
