//! Request extractors.

pub mod admin;
pub mod caller;

pub use admin::{AdminAccess, AdminToken};
pub use caller::{session_cookie, AuthenticatedUser, Caller, SESSION_COOKIE};
