//! The coordinator: mounts the observers, triggers queries, reads it all back.
//!
//! The tracker and the two observers never talk to each other. The harness
//! only composes their outputs into one snapshot for display.

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::form::OptionsProvider;
use crate::model::{NetworkReading, PermissionReading, QueryId, QueryRecord};
use crate::observe::{ConnectivityObserver, PermissionObserver};
use crate::platform::Platform;
use crate::tracker::{IssueError, QueryTracker};

/// Everything the harness can show at one instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessSnapshot {
    pub location_available: bool,
    pub permission: PermissionReading,
    pub network: NetworkReading,
    /// Permission changes seen after the first resolved reading.
    pub permission_changes: u64,
    /// Connectivity transitions seen after the initial read.
    pub network_changes: u64,
    pub history: Vec<QueryRecord>,
}

/// Which component changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    History,
    Permission(PermissionReading),
    Network(NetworkReading),
}

pub struct Harness {
    tracker: QueryTracker,
    permission: PermissionObserver,
    connectivity: ConnectivityObserver,
}

impl Harness {
    /// Build the components and start both observers once.
    ///
    /// Must be called from within a `LocalSet`.
    pub fn mount(platform: &Platform) -> Self {
        let harness = Self {
            tracker: QueryTracker::new(platform.location.clone()),
            permission: PermissionObserver::new(platform.permissions.clone()),
            connectivity: ConnectivityObserver::new(platform.connectivity.clone()),
        };
        harness.permission.start();
        harness.connectivity.start();
        debug!(?platform, "harness mounted");
        harness
    }

    /// Issue a query with a fresh snapshot from `provider`.
    pub fn trigger(&self, provider: &dyn OptionsProvider) -> Result<QueryId, IssueError> {
        self.tracker.issue_query(provider.snapshot())
    }

    pub fn tracker(&self) -> &QueryTracker {
        &self.tracker
    }

    pub fn snapshot(&self) -> HarnessSnapshot {
        HarnessSnapshot {
            location_available: self.tracker.is_available(),
            permission: self.permission.current_state(),
            network: self.connectivity.current_state(),
            permission_changes: self.permission.change_count(),
            network_changes: self.connectivity.change_count(),
            history: self.tracker.history(),
        }
    }

    /// Wait until the permission observer has left `Resolving`.
    pub async fn permission_resolved(&self) -> PermissionReading {
        let mut readings = self.permission.subscribe();
        loop {
            let reading = *readings.borrow_and_update();
            if reading.is_resolved() {
                return reading;
            }
            if readings.changed().await.is_err() {
                return self.permission.current_state();
            }
        }
    }

    /// Subscribe to all three components at once.
    pub fn changes(&self) -> Changes {
        Changes {
            history: self.tracker.subscribe(),
            permission: self.permission.subscribe(),
            network: self.connectivity.subscribe(),
        }
    }

    /// Stop both observers. Idempotent; also happens on drop.
    pub fn unmount(&self) {
        self.permission.stop();
        self.connectivity.stop();
        debug!("harness unmounted");
    }
}

/// Receivers for every component's state, for a re-render loop.
pub struct Changes {
    history: watch::Receiver<u64>,
    permission: watch::Receiver<PermissionReading>,
    network: watch::Receiver<NetworkReading>,
}

impl Changes {
    /// Wait for the next change in any component.
    ///
    /// Returns `None` once every component has gone away.
    pub async fn next(&mut self) -> Option<Change> {
        tokio::select! {
            Ok(()) = self.history.changed() => Some(Change::History),
            Ok(()) = self.permission.changed() => {
                Some(Change::Permission(*self.permission.borrow_and_update()))
            }
            Ok(()) = self.network.changed() => {
                Some(Change::Network(*self.network.borrow_and_update()))
            }
            else => None,
        }
    }
}
