//! Role-gated navigation.
//!
//! - `routes`: route paths the client knows about
//! - `RouteTable`: which roles may view which route
//! - `RouteGuard`: per-navigation authorization state machine
//! - `Navigator`: follows guard redirects and discards stale view updates
//! - `EntryRouter`: decides where the root route lands

pub mod entry;
pub mod guard;
pub mod navigator;
pub mod routes;
pub mod table;

pub use entry::{EntryDecision, EntryReason, EntryRouter};
pub use guard::{GuardDecision, GuardState, RedirectReason, RouteGuard};
pub use navigator::{Navigation, Navigator, ViewHandle};
pub use table::RouteTable;
