//! Session store.
//!
//! - `store`: Sign-in lifecycle and profile loading
//! - `listener`: Reacting to session changes reported by the identity provider

mod listener;
mod store;

pub use store::SessionStore;
