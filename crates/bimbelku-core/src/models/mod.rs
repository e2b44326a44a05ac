//! Data models shared by the auth service, the gateway and the route guard.
//!
//! - `User`, `Role`: the authenticated user's profile as returned by the auth service
//! - `RegisterRequest`: the registration form, with the same client-side checks
//!   the web form runs before submitting

pub mod registration;
pub mod user;

pub use registration::RegisterRequest;
pub use user::{Role, User};
