//! Platform capabilities the harness depends on but does not implement.
//!
//! A platform may lack any of them. Location is required to issue queries;
//! permission introspection and connectivity are optional and their absence
//! surfaces as an `Unsupported` observer reading.
//!
//! Everything here is single-threaded: capabilities are shared with `Rc`,
//! futures are `!Send` and run on a `tokio::task::LocalSet`.

mod listeners;
pub mod simulated;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

pub use listeners::{Listener, ListenerId, ListenerSet};

use crate::model::{PermissionState, Position, PositionError, PositionOptions};

/// A boxed future that stays on the current thread.
pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Which capability a platform is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Location,
    Permissions,
    Connectivity,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Location => "location",
            Self::Permissions => "permissions",
            Self::Connectivity => "connectivity",
        })
    }
}

/// The platform does not provide a capability at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} capability is not available on this platform")]
pub struct CapabilityUnavailable(pub Capability);

/// Single-shot location fixes.
pub trait LocationCapability {
    /// Request one fix. The returned future resolves exactly once.
    fn request_position(
        &self,
        options: &PositionOptions,
    ) -> LocalBoxFuture<Result<Position, PositionError>>;
}

/// What a permission query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionName {
    Geolocation,
}

/// Permission introspection.
pub trait PermissionCapability {
    /// Resolve the live status object for `name`.
    fn query(&self, name: PermissionName) -> LocalBoxFuture<Rc<dyn PermissionStatus>>;
}

/// A live permission status that notifies on change.
pub trait PermissionStatus {
    fn state(&self) -> PermissionState;

    fn add_change_listener(&self, listener: Listener) -> ListenerId;

    /// Returns `false` if `id` was not registered.
    fn remove_change_listener(&self, id: ListenerId) -> bool;
}

/// Connectivity transitions a platform can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// OS-reported network state.
pub trait ConnectivityCapability {
    fn is_online(&self) -> bool;

    fn add_listener(&self, event: ConnectivityEvent, listener: Listener) -> ListenerId;

    /// Returns `false` if `id` was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// The set of capabilities one platform offers.
#[derive(Clone, Default)]
pub struct Platform {
    pub location: Option<Rc<dyn LocationCapability>>,
    pub permissions: Option<Rc<dyn PermissionCapability>>,
    pub connectivity: Option<Rc<dyn ConnectivityCapability>>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("location", &self.location.is_some())
            .field("permissions", &self.permissions.is_some())
            .field("connectivity", &self.connectivity.is_some())
            .finish()
    }
}
