//! Query records: the tracked lifecycle of one location query.

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Position, PositionError, PositionOptions};

/// Stable identity of a query, assigned when it is issued.
pub type QueryId = Uuid;

/// One issued query: when it started, what it asked for, how it ended.
///
/// `finished_at` is set iff `outcome` is no longer pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: QueryId,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,

    /// The options snapshot taken at issue time.
    pub options: PositionOptions,
    pub outcome: QueryOutcome,
}

/// Where a query stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum QueryOutcome {
    Pending,
    Success { position: Position },
    Failure { error: PositionError },
}

/// Display phase of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Progress,
    Finished,
}

impl QueryPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Finished => "finished",
        }
    }
}

impl QueryRecord {
    /// A fresh in-flight record issued at `started_at`.
    pub fn pending(options: PositionOptions, started_at: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            options,
            outcome: QueryOutcome::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, QueryOutcome::Pending)
    }

    pub fn phase(&self) -> QueryPhase {
        if self.is_pending() {
            QueryPhase::Progress
        } else {
            QueryPhase::Finished
        }
    }

    /// Move out of `Pending` into a terminal outcome.
    ///
    /// Returns `false` and leaves the record untouched if it already
    /// finished, or if `outcome` is itself `Pending`. The finish time never
    /// precedes the start time, even if the wall clock stepped backwards.
    pub fn finish(&mut self, outcome: QueryOutcome, at: Timestamp) -> bool {
        if !self.is_pending() || matches!(outcome, QueryOutcome::Pending) {
            return false;
        }
        self.finished_at = Some(at.max(self.started_at));
        self.outcome = outcome;
        true
    }

    /// How long the query took, once it has finished.
    pub fn elapsed(&self) -> Option<SignedDuration> {
        self.finished_at
            .map(|finished| finished.duration_since(self.started_at))
    }

    pub fn position(&self) -> Option<&Position> {
        match &self.outcome {
            QueryOutcome::Success { position } => Some(position),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PositionError> {
        match &self.outcome {
            QueryOutcome::Failure { error } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::Coordinates;

    fn sample_position() -> Position {
        Position {
            coords: Coordinates {
                latitude: 52.52,
                longitude: 13.405,
                accuracy: 20.0,
                altitude: None,
                altitude_accuracy: None,
                heading: None,
                speed: None,
            },
            timestamp: Timestamp::now(),
        }
    }

    #[test]
    fn pending_record_has_no_finish_time() {
        let record = QueryRecord::pending(PositionOptions::default(), Timestamp::now());
        assert!(record.is_pending());
        assert_eq!(record.finished_at, None);
        assert_eq!(record.elapsed(), None);
        assert_eq!(record.phase(), QueryPhase::Progress);
    }

    #[test]
    fn finish_sets_outcome_and_time_once() {
        let mut record = QueryRecord::pending(PositionOptions::default(), Timestamp::now());
        let at = record.started_at + SignedDuration::from_millis(40);

        assert!(record.finish(QueryOutcome::Failure { error: PositionError::timeout() }, at));
        assert_eq!(record.finished_at, Some(at));
        assert_eq!(record.elapsed(), Some(SignedDuration::from_millis(40)));
        assert_eq!(record.phase(), QueryPhase::Finished);

        // A second completion is ignored.
        let later = at + SignedDuration::from_millis(10);
        assert!(!record.finish(
            QueryOutcome::Success {
                position: sample_position()
            },
            later
        ));
        assert_eq!(record.finished_at, Some(at));
        assert!(record.error().is_some());
        assert!(record.position().is_none());
    }

    #[test]
    fn finish_never_precedes_start() {
        let mut record = QueryRecord::pending(PositionOptions::default(), Timestamp::now());
        let earlier = record.started_at - SignedDuration::from_secs(3);

        assert!(record.finish(
            QueryOutcome::Success {
                position: sample_position()
            },
            earlier
        ));
        assert_eq!(record.finished_at, Some(record.started_at));
    }

    #[test]
    fn finishing_with_pending_is_rejected() {
        let mut record = QueryRecord::pending(PositionOptions::default(), Timestamp::now());
        assert!(!record.finish(QueryOutcome::Pending, Timestamp::now()));
        assert!(record.is_pending());
        assert_eq!(record.finished_at, None);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = QueryOutcome::Failure {
            error: PositionError::unavailable(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"]["code"], "position_unavailable");
    }
}
