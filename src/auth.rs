//! Credential models, device identifiers, and authorization-scheme selection.

pub mod credential;
pub mod id;
pub mod scheme;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use scheme::*;
pub use secret::*;
