//! Query lifecycle tracking: issue location queries, record how they end.
//!
//! History is append-only and ordered by issue time. A record is appended
//! synchronously when its query is issued and updated exactly once when the
//! device answers. Queries may finish in any order; each completion finds
//! its own record by id, never by position.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::model::{PositionOptions, QueryId, QueryOutcome, QueryRecord};
use crate::platform::{Capability, CapabilityUnavailable, LocationCapability};

/// Why a query could not be issued. Nothing is recorded in either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Unavailable(#[from] CapabilityUnavailable),

    #[error("queries must be issued from within a tokio runtime")]
    NoRuntime,
}

/// Records in issue order, plus an index from id to slot.
#[derive(Default)]
struct History {
    records: Vec<QueryRecord>,
    slots: HashMap<QueryId, usize>,
}

impl History {
    fn append(&mut self, record: QueryRecord) {
        self.slots.insert(record.id, self.records.len());
        self.records.push(record);
    }

    fn get_mut(&mut self, id: QueryId) -> Option<&mut QueryRecord> {
        let slot = *self.slots.get(&id)?;
        self.records.get_mut(slot)
    }
}

struct Shared {
    history: RefCell<History>,
    revision: watch::Sender<u64>,
    clock: Clock,
}

impl Shared {
    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn complete(&self, id: QueryId, outcome: QueryOutcome) {
        let finished = {
            let mut history = self.history.borrow_mut();
            let Some(record) = history.get_mut(id) else {
                warn!(%id, "completion for unknown query");
                return;
            };
            if !record.finish(outcome, self.clock.now()) {
                warn!(%id, "query already finished, ignoring completion");
                return;
            }
            record.clone()
        };

        match (&finished.outcome, finished.elapsed()) {
            (QueryOutcome::Failure { error }, elapsed) => {
                info!(%id, code = error.code.as_str(), ?elapsed, "query failed");
            }
            (_, elapsed) => info!(%id, ?elapsed, "query succeeded"),
        }
        self.bump();
    }
}

/// Issues location queries and owns their history.
pub struct QueryTracker {
    location: Option<Rc<dyn LocationCapability>>,
    shared: Rc<Shared>,
}

impl QueryTracker {
    pub fn new(location: Option<Rc<dyn LocationCapability>>) -> Self {
        let (revision, _rx) = watch::channel(0);
        Self {
            location,
            shared: Rc::new(Shared {
                history: RefCell::new(History::default()),
                revision,
                clock: Clock::start(),
            }),
        }
    }

    /// Whether the platform can answer location queries at all.
    pub fn is_available(&self) -> bool {
        self.location.is_some()
    }

    /// Issue one location query.
    ///
    /// A pending record is in history by the time this returns. The device
    /// is asked on a local task; its answer, success or failure, lands on
    /// that record only. Fails, appending nothing, when the platform has no
    /// location capability or there is no runtime to wait on the device.
    /// Inside a runtime it must run within a `LocalSet`.
    pub fn issue_query(&self, options: PositionOptions) -> Result<QueryId, IssueError> {
        let location = self
            .location
            .clone()
            .ok_or(CapabilityUnavailable(Capability::Location))?;
        if Handle::try_current().is_err() {
            return Err(IssueError::NoRuntime);
        }

        let record = QueryRecord::pending(options, self.shared.clock.now());
        let id = record.id;
        self.shared.history.borrow_mut().append(record);
        self.shared.bump();
        debug!(%id, ?options, "query issued");

        let request = location.request_position(&options);
        let shared: Weak<Shared> = Rc::downgrade(&self.shared);
        tokio::task::spawn_local(async move {
            let outcome = match request.await {
                Ok(position) => QueryOutcome::Success { position },
                Err(error) => QueryOutcome::Failure { error },
            };
            match shared.upgrade() {
                Some(shared) => shared.complete(id, outcome),
                None => debug!(%id, "tracker dropped before query finished"),
            }
        });

        Ok(id)
    }

    /// Every record in issue order, as of now.
    pub fn history(&self) -> Vec<QueryRecord> {
        self.shared.history.borrow().records.clone()
    }

    #[cfg(test)]
    fn record(&self, id: QueryId) -> Option<QueryRecord> {
        let history = self.shared.history.borrow();
        let slot = *history.slots.get(&id)?;
        history.records.get(slot).cloned()
    }

    /// Number of queries still waiting on the device.
    pub fn in_flight(&self) -> usize {
        self.shared
            .history
            .borrow()
            .records
            .iter()
            .filter(|r| r.is_pending())
            .count()
    }

    /// A counter that moves on every append and every completion.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Wait until no query is in flight.
    pub async fn settled(&self) {
        let mut revisions = self.subscribe();
        while self.in_flight() > 0 {
            if revisions.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use jiff::{SignedDuration, Timestamp};
    use tokio::task::LocalSet;

    use crate::model::{PermissionState, PositionErrorCode};
    use crate::platform::simulated::{DeviceProfile, ScriptedFix, SimulatedPlatform};

    fn granted_device() -> SimulatedPlatform {
        SimulatedPlatform::from_profile(&DeviceProfile {
            permission: PermissionState::Granted,
            latency_ms: 50,
            ..DeviceProfile::default()
        })
    }

    fn tracker_for(platform: &SimulatedPlatform) -> QueryTracker {
        QueryTracker::new(platform.platform().location)
    }

    fn assert_finish_invariants(record: &QueryRecord) {
        assert_eq!(record.finished_at.is_some(), !record.is_pending());
        if let Some(finished) = record.finished_at {
            assert!(finished >= record.started_at);
        }
    }

    #[test]
    fn missing_location_capability_appends_nothing() {
        let tracker = QueryTracker::new(None);
        assert!(!tracker.is_available());

        let err = tracker.issue_query(PositionOptions::default()).unwrap_err();

        assert_eq!(
            err,
            IssueError::Unavailable(CapabilityUnavailable(Capability::Location))
        );
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn issuing_without_a_runtime_fails_cleanly() {
        let device = granted_device();
        let tracker = tracker_for(&device);

        let err = tracker.issue_query(PositionOptions::default()).unwrap_err();

        assert_eq!(err, IssueError::NoRuntime);
        assert!(tracker.history().is_empty());
        assert_eq!(device.location.unwrap().requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn record_is_pending_before_device_answers() {
        LocalSet::new()
            .run_until(async {
                let device = granted_device();
                let tracker = tracker_for(&device);

                let id = tracker.issue_query(PositionOptions::default()).unwrap();

                let history = tracker.history();
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].id, id);
                assert!(history[0].is_pending());
                assert_eq!(history[0].finished_at, None);
                assert_eq!(tracker.in_flight(), 1);

                tracker.settled().await;

                let record = tracker.record(id).unwrap();
                assert!(record.position().is_some());
                assert_finish_invariants(&record);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_completion_updates_the_right_records() {
        LocalSet::new()
            .run_until(async {
                let device = granted_device();
                let location = device.location.clone().unwrap();
                location.push_script(ScriptedFix::success_after(6_000));
                location.push_script(ScriptedFix::success_after(100));
                let tracker = tracker_for(&device);

                let a = tracker
                    .issue_query(PositionOptions {
                        timeout: Some(5_000),
                        ..PositionOptions::default()
                    })
                    .unwrap();
                let b = tracker
                    .issue_query(PositionOptions {
                        enable_high_accuracy: Some(true),
                        ..PositionOptions::default()
                    })
                    .unwrap();

                // B finishes first.
                tokio::time::sleep(Duration::from_millis(200)).await;
                let history = tracker.history();
                assert_eq!(history[0].id, a);
                assert!(history[0].is_pending());
                assert_eq!(history[1].id, b);
                assert!(history[1].position().is_some());

                // A times out later.
                tracker.settled().await;
                let history = tracker.history();
                assert_eq!(
                    history.iter().map(|r| r.id).collect::<Vec<_>>(),
                    vec![a, b]
                );
                assert_eq!(
                    history[0].error().map(|e| e.code),
                    Some(PositionErrorCode::Timeout)
                );
                assert!(history[1].position().is_some());
                assert!(history[0].finished_at > history[1].finished_at);

                let took = |record: &QueryRecord| record.elapsed().unwrap();
                assert!(took(&history[0]) >= SignedDuration::from_millis(5_000));
                assert!(took(&history[0]) < SignedDuration::from_millis(5_050));
                assert!(took(&history[1]) >= SignedDuration::from_millis(100));
                assert!(took(&history[1]) < SignedDuration::from_millis(150));
                for record in &history {
                    assert_finish_invariants(record);
                }
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn each_completion_changes_exactly_one_record() {
        LocalSet::new()
            .run_until(async {
                let device = granted_device();
                let location = device.location.clone().unwrap();
                for latency in [300, 100, 200] {
                    location.push_script(ScriptedFix::success_after(latency));
                }
                let tracker = tracker_for(&device);
                for _ in 0..3 {
                    tracker.issue_query(PositionOptions::default()).unwrap();
                }

                let mut revisions = tracker.subscribe();
                revisions.borrow_and_update();
                let mut before = tracker.history();
                let mut finish_order = Vec::new();
                while tracker.in_flight() > 0 {
                    revisions.changed().await.unwrap();
                    let after = tracker.history();
                    assert_eq!(after.len(), before.len());
                    let changed: Vec<_> = before
                        .iter()
                        .zip(&after)
                        .filter(|(old, new)| old != new)
                        .map(|(_, new)| new.id)
                        .collect();
                    assert_eq!(changed.len(), 1);
                    finish_order.extend(changed);
                    before = after;
                }

                let issue_order: Vec<_> = tracker.history().iter().map(|r| r.id).collect();
                assert_eq!(
                    finish_order,
                    vec![issue_order[1], issue_order[2], issue_order[0]]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn device_failures_are_recorded_not_returned() {
        LocalSet::new()
            .run_until(async {
                let device = SimulatedPlatform::from_profile(&DeviceProfile {
                    permission: PermissionState::Denied,
                    ..DeviceProfile::default()
                });
                let tracker = tracker_for(&device);

                let id = tracker.issue_query(PositionOptions::default()).unwrap();
                tracker.settled().await;

                let record = tracker.record(id).unwrap();
                assert_eq!(
                    record.error().map(|e| e.code),
                    Some(PositionErrorCode::PermissionDenied)
                );
                assert_finish_invariants(&record);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn options_are_captured_by_value() {
        LocalSet::new()
            .run_until(async {
                let device = granted_device();
                let tracker = tracker_for(&device);

                let mut options = PositionOptions {
                    maximum_age: Some(1_000),
                    ..PositionOptions::default()
                };
                let id = tracker.issue_query(options).unwrap();
                options.maximum_age = Some(0);
                options.timeout = Some(1);

                let record = tracker.record(id).unwrap();
                assert_eq!(record.options.maximum_age, Some(1_000));
                assert_eq!(record.options.timeout, None);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn history_length_matches_issue_count() {
        LocalSet::new()
            .run_until(async {
                let device = granted_device();
                let tracker = tracker_for(&device);

                let ids: Vec<_> = (0..5)
                    .map(|_| tracker.issue_query(PositionOptions::default()).unwrap())
                    .collect();
                tracker.settled().await;

                let history = tracker.history();
                assert_eq!(history.len(), 5);
                assert_eq!(history.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
                assert_eq!(tracker.in_flight(), 0);
            })
            .await;
    }

    #[test]
    fn completion_is_applied_at_most_once() {
        let tracker = QueryTracker::new(None);
        let record = QueryRecord::pending(PositionOptions::default(), Timestamp::now());
        let id = record.id;
        tracker.shared.history.borrow_mut().append(record);

        tracker.shared.complete(
            id,
            QueryOutcome::Failure {
                error: crate::model::PositionError::timeout(),
            },
        );
        let first = tracker.record(id).unwrap();

        tracker.shared.complete(
            id,
            QueryOutcome::Failure {
                error: crate::model::PositionError::unavailable(),
            },
        );
        assert_eq!(tracker.record(id).unwrap(), first);
    }
}
