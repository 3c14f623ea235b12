//! An in-process device whose behavior comes from a [`DeviceProfile`].
//!
//! There is no location hardware behind a terminal, so the CLI drives this
//! device instead. Latencies are real `tokio` timers, which lets tests run
//! them on paused time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future;
use std::rc::Rc;
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{
    ConnectivityCapability, ConnectivityEvent, Listener, ListenerId, ListenerSet, LocalBoxFuture,
    LocationCapability, PermissionCapability, PermissionName, PermissionStatus, Platform,
};
use crate::clock::Clock;
use crate::model::{
    Coordinates, PermissionState, Position, PositionError, PositionErrorCode, PositionOptions,
};

/// How the simulated device behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DeviceProfile {
    /// Whether each capability exists at all.
    pub location: bool,
    pub permissions: bool,
    pub connectivity: bool,

    /// Grant status at startup.
    pub permission: PermissionState,

    /// What the "user" answers when a query hits a `prompt` status.
    pub prompt_answer: PermissionState,

    /// How long permission introspection takes to answer.
    pub permission_delay_ms: u64,

    pub online: bool,

    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub altitude_accuracy_m: Option<f64>,
    pub accuracy_m: f64,
    pub high_accuracy_m: f64,
    pub latency_ms: u64,
    pub high_accuracy_latency_ms: u64,

    /// Per-query responses, consumed in issue order before falling back
    /// to the defaults above.
    pub script: Vec<ScriptedFix>,

    /// Permission and connectivity changes replayed during a session.
    pub timeline: Vec<TimelineEvent>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            location: true,
            permissions: true,
            connectivity: true,
            permission: PermissionState::Prompt,
            prompt_answer: PermissionState::Granted,
            permission_delay_ms: 10,
            online: true,
            latitude: 52.520_008,
            longitude: 13.404_954,
            altitude: None,
            altitude_accuracy_m: None,
            accuracy_m: 150.0,
            high_accuracy_m: 8.0,
            latency_ms: 250,
            high_accuracy_latency_ms: 1200,
            script: Vec::new(),
            timeline: Vec::new(),
        }
    }
}

/// One scripted answer to a location query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScriptedFix {
    pub latency_ms: u64,

    /// Fail with this code instead of producing a fix.
    pub error: Option<PositionErrorCode>,
    pub message: Option<String>,

    /// Override the reported accuracy of a successful fix.
    pub accuracy_m: Option<f64>,
}

impl ScriptedFix {
    #[cfg(test)]
    pub fn success_after(latency_ms: u64) -> Self {
        Self {
            latency_ms,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn failure_after(latency_ms: u64, code: PositionErrorCode) -> Self {
        Self {
            latency_ms,
            error: Some(code),
            ..Self::default()
        }
    }

    fn into_result(self) -> Result<Option<f64>, PositionError> {
        match self.error {
            Some(code) => Err(match self.message {
                Some(message) => PositionError::new(code, message),
                None => PositionError::from_code(code),
            }),
            None => Ok(self.accuracy_m),
        }
    }
}

/// A device state change scheduled relative to session start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimelineEvent {
    pub at_ms: u64,
    pub online: Option<bool>,
    pub permission: Option<PermissionState>,
}

// ── Permissions ──

/// The device's live grant status for location access.
///
/// Exists whether or not the platform lets anyone introspect it.
pub struct SimulatedPermissionStatus {
    state: Cell<PermissionState>,
    listeners: ListenerSet,
}

impl SimulatedPermissionStatus {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: Cell::new(state),
            listeners: ListenerSet::new(),
        }
    }

    /// Change the grant status, notifying listeners on an actual change.
    pub fn set_state(&self, state: PermissionState) -> bool {
        let previous = self.state.replace(state);
        if previous == state {
            return false;
        }
        debug!(from = previous.as_str(), to = state.as_str(), "permission changed");
        self.listeners.emit(());
        true
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl PermissionStatus for SimulatedPermissionStatus {
    fn state(&self) -> PermissionState {
        self.state.get()
    }

    fn add_change_listener(&self, listener: Listener) -> ListenerId {
        self.listeners.add((), listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Permission introspection over a [`SimulatedPermissionStatus`].
pub struct SimulatedPermissions {
    status: Rc<SimulatedPermissionStatus>,
    delay: Duration,
    queries: Cell<u32>,
}

impl SimulatedPermissions {
    pub fn new(status: Rc<SimulatedPermissionStatus>, delay: Duration) -> Self {
        Self {
            status,
            delay,
            queries: Cell::new(0),
        }
    }

    /// How many times the status was queried.
    #[cfg(test)]
    pub fn queries(&self) -> u32 {
        self.queries.get()
    }
}

impl PermissionCapability for SimulatedPermissions {
    fn query(&self, name: PermissionName) -> LocalBoxFuture<Rc<dyn PermissionStatus>> {
        self.queries.set(self.queries.get() + 1);
        debug!(?name, delay = ?self.delay, "permission query");
        let status: Rc<dyn PermissionStatus> = self.status.clone();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            status
        })
    }
}

// ── Connectivity ──

/// OS-style online flag with `online`/`offline` transition events.
pub struct SimulatedConnectivity {
    online: Cell<bool>,
    listeners: ListenerSet<ConnectivityEvent>,
}

impl SimulatedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Cell::new(online),
            listeners: ListenerSet::new(),
        }
    }

    /// Flip the interface state. Events fire on transitions only.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.replace(online) == online {
            return false;
        }
        debug!(online, "connectivity changed");
        self.listeners.emit(if online {
            ConnectivityEvent::Online
        } else {
            ConnectivityEvent::Offline
        });
        true
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ConnectivityCapability for SimulatedConnectivity {
    fn is_online(&self) -> bool {
        self.online.get()
    }

    fn add_listener(&self, event: ConnectivityEvent, listener: Listener) -> ListenerId {
        self.listeners.add(event, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

// ── Location ──

#[derive(Debug, Clone, Copy)]
struct Fix {
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
    altitude_accuracy: Option<f64>,
}

impl Fix {
    fn at(self, accuracy: f64, timestamp: Timestamp) -> Position {
        Position {
            coords: Coordinates {
                latitude: self.latitude,
                longitude: self.longitude,
                accuracy,
                altitude: self.altitude,
                altitude_accuracy: self.altitude_accuracy,
                heading: None,
                speed: None,
            },
            timestamp,
        }
    }
}

/// Location fixes with scripted latency, a fix cache and device-side timeouts.
pub struct SimulatedLocation {
    fix: Fix,
    accuracy: f64,
    high_accuracy: f64,
    latency: Duration,
    high_accuracy_latency: Duration,
    prompt_answer: PermissionState,
    permission: Rc<SimulatedPermissionStatus>,
    script: RefCell<VecDeque<ScriptedFix>>,
    /// Last fresh fix and when, on the runtime clock, it was taken.
    cache: Rc<RefCell<Option<(Instant, Position)>>>,
    requests: Cell<u64>,
    clock: Clock,
}

impl SimulatedLocation {
    pub fn new(profile: &DeviceProfile, permission: Rc<SimulatedPermissionStatus>) -> Self {
        Self {
            fix: Fix {
                latitude: profile.latitude,
                longitude: profile.longitude,
                altitude: profile.altitude,
                altitude_accuracy: profile.altitude_accuracy_m,
            },
            accuracy: profile.accuracy_m,
            high_accuracy: profile.high_accuracy_m,
            latency: Duration::from_millis(profile.latency_ms),
            high_accuracy_latency: Duration::from_millis(profile.high_accuracy_latency_ms),
            prompt_answer: profile.prompt_answer,
            permission,
            script: RefCell::new(profile.script.iter().cloned().collect()),
            cache: Rc::new(RefCell::new(None)),
            requests: Cell::new(0),
            clock: Clock::start(),
        }
    }

    /// Queue a response for a future query.
    #[cfg(test)]
    pub fn push_script(&self, step: ScriptedFix) {
        self.script.borrow_mut().push_back(step);
    }

    /// How many fixes have been requested.
    #[cfg(test)]
    pub fn requests(&self) -> u64 {
        self.requests.get()
    }

    fn cached_within(&self, maximum_age: Option<i64>) -> Option<Position> {
        let max_age = maximum_age
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)?;
        let (taken_at, cached) = self.cache.borrow().clone()?;
        (taken_at.elapsed() <= Duration::from_millis(max_age)).then_some(cached)
    }
}

impl LocationCapability for SimulatedLocation {
    fn request_position(
        &self,
        options: &PositionOptions,
    ) -> LocalBoxFuture<Result<Position, PositionError>> {
        self.requests.set(self.requests.get() + 1);

        if self.permission.state() == PermissionState::Prompt {
            info!(answer = self.prompt_answer.as_str(), "answering permission prompt");
            self.permission.set_state(self.prompt_answer);
        }
        if self.permission.state() == PermissionState::Denied {
            return Box::pin(future::ready(Err(PositionError::permission_denied())));
        }

        if let Some(cached) = self.cached_within(options.maximum_age) {
            debug!("answering from cached fix");
            return Box::pin(future::ready(Ok(cached)));
        }

        let high_accuracy = options.wants_high_accuracy();
        let default_accuracy = if high_accuracy {
            self.high_accuracy
        } else {
            self.accuracy
        };
        let (latency, result) = match self.script.borrow_mut().pop_front() {
            Some(step) => (Duration::from_millis(step.latency_ms), step.into_result()),
            None if high_accuracy => (self.high_accuracy_latency, Ok(None)),
            None => (self.latency, Ok(None)),
        };

        // Negative timeouts behave like zero.
        let timeout = options
            .timeout
            .map(|ms| Duration::from_millis(u64::try_from(ms).unwrap_or(0)));

        let fix = self.fix;
        let clock = self.clock;
        let cache = Rc::clone(&self.cache);
        Box::pin(async move {
            let attempt = async move {
                tokio::time::sleep(latency).await;
                result
            };
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, attempt)
                    .await
                    .unwrap_or_else(|_| Err(PositionError::timeout())),
                None => attempt.await,
            };
            result.map(|accuracy| {
                let position = fix.at(accuracy.unwrap_or(default_accuracy), clock.now());
                *cache.borrow_mut() = Some((Instant::now(), position.clone()));
                position
            })
        })
    }
}

// ── Platform ──

/// All simulated capabilities built from one profile.
///
/// Capabilities the profile disables are `None`. The permission status
/// always exists because location queries consult it.
pub struct SimulatedPlatform {
    pub status: Rc<SimulatedPermissionStatus>,
    pub location: Option<Rc<SimulatedLocation>>,
    pub permissions: Option<Rc<SimulatedPermissions>>,
    pub connectivity: Option<Rc<SimulatedConnectivity>>,
    timeline: Vec<TimelineEvent>,
}

impl SimulatedPlatform {
    pub fn from_profile(profile: &DeviceProfile) -> Self {
        let status = Rc::new(SimulatedPermissionStatus::new(profile.permission));
        let location = profile
            .location
            .then(|| Rc::new(SimulatedLocation::new(profile, Rc::clone(&status))));
        let permissions = profile.permissions.then(|| {
            Rc::new(SimulatedPermissions::new(
                Rc::clone(&status),
                Duration::from_millis(profile.permission_delay_ms),
            ))
        });
        let connectivity = profile
            .connectivity
            .then(|| Rc::new(SimulatedConnectivity::new(profile.online)));

        let mut timeline = profile.timeline.clone();
        timeline.sort_by_key(|event| event.at_ms);

        Self {
            status,
            location,
            permissions,
            connectivity,
            timeline,
        }
    }

    /// The capability view handed to the tracker and observers.
    pub fn platform(&self) -> Platform {
        Platform {
            location: self
                .location
                .clone()
                .map(|l| l as Rc<dyn LocationCapability>),
            permissions: self
                .permissions
                .clone()
                .map(|p| p as Rc<dyn PermissionCapability>),
            connectivity: self
                .connectivity
                .clone()
                .map(|c| c as Rc<dyn ConnectivityCapability>),
        }
    }

    /// Replay the profile's timeline on a local task, relative to now.
    ///
    /// Must be called from within a `LocalSet`.
    pub fn play_timeline(&self) -> JoinHandle<()> {
        let status = Rc::clone(&self.status);
        let connectivity = self.connectivity.clone();
        let timeline = self.timeline.clone();
        let start = tokio::time::Instant::now();
        tokio::task::spawn_local(async move {
            for event in &timeline {
                tokio::time::sleep_until(start + Duration::from_millis(event.at_ms)).await;
                apply_event(&status, connectivity.as_deref(), event);
            }
        })
    }
}

fn apply_event(
    status: &SimulatedPermissionStatus,
    connectivity: Option<&SimulatedConnectivity>,
    event: &TimelineEvent,
) {
    debug!(at_ms = event.at_ms, "timeline event");
    if let Some(online) = event.online {
        match connectivity {
            Some(connectivity) => {
                connectivity.set_online(online);
            }
            None => debug!("no connectivity capability, ignoring online={online}"),
        }
    }
    if let Some(permission) = event.permission {
        status.set_state(permission);
    }
}
