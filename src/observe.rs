//! Passive observers of ambient device state.
//!
//! Each observer initializes from the current state, subscribes to future
//! changes, and releases its subscription exactly once on `stop()` or drop.
//! Notifications that arrive after a logical stop are discarded.

mod connectivity;
mod permission;
mod value;

pub use connectivity::ConnectivityObserver;
pub use permission::PermissionObserver;
