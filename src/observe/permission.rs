//! Permission observer: grant status for location access, kept current.
//!
//! ```text
//! Uninitialized ─start()─▶ Resolving ─resolved─▶ Granted | Denied | Prompt
//!       │                                              ▲        │
//!       └─start() without introspection─▶ Unsupported  └─change─┘
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::value::ObservedValue;
use crate::model::PermissionReading;
use crate::platform::{
    Capability, CapabilityUnavailable, ListenerId, PermissionCapability, PermissionName,
    PermissionStatus,
};

/// A registered change listener and the status object it is attached to.
struct Subscription {
    status: Rc<dyn PermissionStatus>,
    listener: ListenerId,
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    stopped: bool,
    resolving: Option<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

struct Shared {
    value: ObservedValue<PermissionReading>,
    lifecycle: RefCell<Lifecycle>,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.lifecycle.borrow().stopped
    }

    fn apply(&self, reading: PermissionReading) {
        if self.is_stopped() {
            debug!(?reading, "discarding permission reading after stop");
            return;
        }
        if self.value.record(reading) {
            info!(permission = reading.as_str(), "permission changed");
        }
    }
}

/// Watches the geolocation permission for the lifetime of the instance.
///
/// Single use: once stopped it cannot be restarted. Dropping it stops it.
pub struct PermissionObserver {
    permissions: Option<Rc<dyn PermissionCapability>>,
    shared: Rc<Shared>,
}

impl PermissionObserver {
    pub fn new(permissions: Option<Rc<dyn PermissionCapability>>) -> Self {
        Self {
            permissions,
            shared: Rc::new(Shared {
                value: ObservedValue::new(PermissionReading::Uninitialized),
                lifecycle: RefCell::new(Lifecycle::default()),
            }),
        }
    }

    /// Begin observing.
    ///
    /// Without introspection the reading becomes `Unsupported` right away.
    /// Otherwise it becomes `Resolving` and a local task resolves the
    /// status, then attaches one change listener. That needs a runtime:
    /// without one this logs a warning and leaves the observer unstarted.
    /// Inside a runtime it must run within a `LocalSet`.
    pub fn start(&self) {
        if self.permissions.is_some() && Handle::try_current().is_err() {
            warn!("permission observer needs a tokio runtime, not started");
            return;
        }
        {
            let mut lifecycle = self.shared.lifecycle.borrow_mut();
            if lifecycle.started || lifecycle.stopped {
                debug!("permission observer already started or stopped");
                return;
            }
            lifecycle.started = true;
        }

        let Some(permissions) = self.permissions.clone() else {
            info!("{}", CapabilityUnavailable(Capability::Permissions));
            self.shared.value.record(PermissionReading::Unsupported);
            return;
        };

        self.shared.value.mark(PermissionReading::Resolving);
        let shared = Rc::downgrade(&self.shared);
        let task = tokio::task::spawn_local(async move {
            let status = permissions.query(PermissionName::Geolocation).await;
            if let Some(shared) = shared.upgrade() {
                attach(&shared, status);
            }
        });
        self.shared.lifecycle.borrow_mut().resolving = Some(task);
    }

    /// Stop observing and release the change listener.
    ///
    /// Safe before `start()`, and safe to call any number of times.
    pub fn stop(&self) {
        let (resolving, subscription) = {
            let mut lifecycle = self.shared.lifecycle.borrow_mut();
            lifecycle.stopped = true;
            (lifecycle.resolving.take(), lifecycle.subscription.take())
        };

        if let Some(task) = resolving {
            task.abort();
        }
        if let Some(Subscription { status, listener }) = subscription {
            let removed = status.remove_change_listener(listener);
            debug!(removed, "permission listener released");
        }
    }

    /// The latest known reading.
    pub fn current_state(&self) -> PermissionReading {
        self.shared.value.get()
    }

    /// Whether a change listener is currently registered.
    #[cfg(test)]
    pub fn is_subscribed(&self) -> bool {
        self.shared.lifecycle.borrow().subscription.is_some()
    }

    /// How many times the reading changed after it first resolved.
    pub fn change_count(&self) -> u64 {
        self.shared.value.change_count()
    }

    pub fn subscribe(&self) -> watch::Receiver<PermissionReading> {
        self.shared.value.subscribe()
    }
}

impl Drop for PermissionObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Record the resolved state and attach the change listener.
///
/// The listener re-reads the status on every event, so notifications that
/// fired before resolution never skew the baseline.
fn attach(shared: &Rc<Shared>, status: Rc<dyn PermissionStatus>) {
    if shared.is_stopped() {
        debug!("permission resolved after stop, not subscribing");
        return;
    }

    shared.apply(status.state().into());

    let weak_shared: Weak<Shared> = Rc::downgrade(shared);
    let weak_status: Weak<dyn PermissionStatus> = Rc::downgrade(&status);
    let listener = status.add_change_listener(Rc::new(move || {
        let (Some(shared), Some(status)) = (weak_shared.upgrade(), weak_status.upgrade()) else {
            return;
        };
        shared.apply(status.state().into());
    }));

    let mut lifecycle = shared.lifecycle.borrow_mut();
    lifecycle.resolving = None;
    lifecycle.subscription = Some(Subscription { status, listener });
    debug!("permission listener registered");
}
