//! Connectivity observer: OS-reported online/offline state.
//!
//! This is the interface signal only. `Online` says nothing about whether
//! any remote service is reachable.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tokio::sync::watch;
use tracing::{debug, info};

use super::value::ObservedValue;
use crate::model::NetworkReading;
use crate::platform::{
    Capability, CapabilityUnavailable, ConnectivityCapability, ConnectivityEvent, ListenerId,
};

#[derive(Default)]
struct Lifecycle {
    started: bool,
    stopped: bool,
    listeners: Vec<ListenerId>,
}

struct Shared {
    value: ObservedValue<NetworkReading>,
    lifecycle: RefCell<Lifecycle>,
}

impl Shared {
    fn apply(&self, reading: NetworkReading) {
        if self.lifecycle.borrow().stopped {
            debug!(?reading, "discarding connectivity event after stop");
            return;
        }
        if self.value.record(reading) {
            info!(network = reading.as_str(), "connectivity changed");
        }
    }
}

/// Watches the connectivity signal for the lifetime of the instance.
///
/// Single use: once stopped it cannot be restarted. Dropping it stops it.
pub struct ConnectivityObserver {
    connectivity: Option<Rc<dyn ConnectivityCapability>>,
    shared: Rc<Shared>,
}

impl ConnectivityObserver {
    pub fn new(connectivity: Option<Rc<dyn ConnectivityCapability>>) -> Self {
        Self {
            connectivity,
            shared: Rc::new(Shared {
                value: ObservedValue::new(NetworkReading::Uninitialized),
                lifecycle: RefCell::new(Lifecycle::default()),
            }),
        }
    }

    /// Read the current state and register the `online`/`offline` listeners.
    ///
    /// Fully synchronous: both listeners are registered when this returns.
    pub fn start(&self) {
        {
            let mut lifecycle = self.shared.lifecycle.borrow_mut();
            if lifecycle.started || lifecycle.stopped {
                debug!("connectivity observer already started or stopped");
                return;
            }
            lifecycle.started = true;
        }

        let Some(connectivity) = &self.connectivity else {
            info!("{}", CapabilityUnavailable(Capability::Connectivity));
            self.shared.value.record(NetworkReading::Unsupported);
            return;
        };

        self.shared
            .value
            .record(NetworkReading::from_online(connectivity.is_online()));

        let listeners: Vec<ListenerId> = [ConnectivityEvent::Online, ConnectivityEvent::Offline]
            .into_iter()
            .map(|event| {
                let reading = NetworkReading::from_online(event == ConnectivityEvent::Online);
                let shared: Weak<Shared> = Rc::downgrade(&self.shared);
                connectivity.add_listener(
                    event,
                    Rc::new(move || {
                        if let Some(shared) = shared.upgrade() {
                            shared.apply(reading);
                        }
                    }),
                )
            })
            .collect();

        self.shared.lifecycle.borrow_mut().listeners = listeners;
        debug!("connectivity listeners registered");
    }

    /// Unregister both listeners.
    ///
    /// Safe before `start()`, and safe to call any number of times.
    pub fn stop(&self) {
        let listeners = {
            let mut lifecycle = self.shared.lifecycle.borrow_mut();
            lifecycle.stopped = true;
            std::mem::take(&mut lifecycle.listeners)
        };
        if listeners.is_empty() {
            return;
        }

        if let Some(connectivity) = &self.connectivity {
            for id in listeners {
                connectivity.remove_listener(id);
            }
            debug!("connectivity listeners released");
        }
    }

    pub fn current_state(&self) -> NetworkReading {
        self.shared.value.get()
    }

    #[cfg(test)]
    pub fn is_subscribed(&self) -> bool {
        !self.shared.lifecycle.borrow().listeners.is_empty()
    }

    /// How many times the reading changed after the initial read.
    pub fn change_count(&self) -> u64 {
        self.shared.value.change_count()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkReading> {
        self.shared.value.subscribe()
    }
}

impl Drop for ConnectivityObserver {
    fn drop(&mut self) {
        self.stop();
    }
}
