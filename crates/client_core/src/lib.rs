//! Client side of the dashboard: a server-backed session with optimistic
//! mutations, plus the drag and change-feed plumbing a front end needs.

pub mod backend;
pub mod drag;
pub mod error;
mod listener;
pub mod optimistic;
mod session;

pub use backend::{DashboardBackend, HttpBackend, DEFAULT_REQUEST_TIMEOUT};
pub use drag::{DragOutcome, DragPresentation, DragTracker, Point};
pub use error::ClientError;
pub use listener::{change_feed_url, spawn_change_listener};
pub use optimistic::{Mutation, MutationKind};
pub use session::{ClientEvent, DashboardSession, SyncState};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
