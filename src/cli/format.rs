//! Output formatting for CLI display.

use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde_json::{Value, json};

use crate::harness::{Change, HarnessSnapshot};
use crate::model::{Position, PositionError, PositionErrorCode, PositionOptions, QueryRecord};

/// Availability, permission and network, one per line.
pub(super) fn format_status(snapshot: &HarnessSnapshot) -> String {
    let availability = if snapshot.location_available {
        "available"
    } else {
        "unavailable"
    };
    format!(
        "Geolocation API: {availability}\n\
         Geolocation Permission: {}\n\
         Network: {}",
        snapshot.permission, snapshot.network
    )
}

/// How often each observer saw its reading change after the first one.
pub(super) fn format_change_counts(snapshot: &HarnessSnapshot) -> String {
    format!(
        "Changes observed: permission {}, network {}",
        snapshot.permission_changes, snapshot.network_changes
    )
}

/// One history entry, numbered from 1.
pub(super) fn format_record(number: usize, record: &QueryRecord, tz: &TimeZone) -> String {
    let started = clock(record.started_at, tz);
    let finished = match record.finished_at {
        Some(at) => clock(at, tz),
        None => "not yet".to_string(),
    };
    let took = record
        .elapsed()
        .map(|d| format!(" in {}ms", d.as_millis()))
        .unwrap_or_default();

    let mut out = format!(
        "{number}. [{}] Started: {started}; Finished: {finished}{took};\n   Options: {}",
        record.phase().as_str(),
        indent(&pretty(&options_json(&record.options)))
    );
    if let Some(error) = record.error() {
        out.push_str(&format!("\n   Error: {}", indent(&pretty(&error_json(error)))));
    }
    if let Some(position) = record.position() {
        out.push_str(&format!(
            "\n   Position: {}",
            indent(&pretty(&position_json(position)))
        ));
    }
    out
}

pub(super) fn format_history(history: &[QueryRecord], tz: &TimeZone) -> String {
    if history.is_empty() {
        return "No queries".to_string();
    }
    history
        .iter()
        .enumerate()
        .map(|(i, record)| format_record(i + 1, record, tz))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A single line describing what changed.
pub(super) fn format_change(change: &Change, snapshot: &HarnessSnapshot) -> String {
    match change {
        Change::Permission(reading) => format!("permission: {reading}"),
        Change::Network(reading) => format!("network: {reading}"),
        Change::History => {
            let total = snapshot.history.len();
            let in_flight = snapshot.history.iter().filter(|r| r.is_pending()).count();
            let failed = snapshot
                .history
                .iter()
                .filter(|r| r.error().is_some())
                .count();
            format!("history: {total} queries, {in_flight} in flight, {failed} failed")
        }
    }
}

/// Options with unset fields spelled out as `undefined`.
pub(super) fn options_json(options: &PositionOptions) -> Value {
    fn or_undefined<T: Into<Value>>(value: Option<T>) -> Value {
        value.map_or_else(|| Value::from("undefined"), Into::into)
    }
    json!({
        "enableHighAccuracy": or_undefined(options.enable_high_accuracy),
        "maximumAge": or_undefined(options.maximum_age),
        "timeout": or_undefined(options.timeout),
    })
}

/// The error with the platform's code constants alongside.
pub(super) fn error_json(error: &PositionError) -> Value {
    json!({
        "code": error.code.code(),
        "message": error.message,
        "PERMISSION_DENIED": PositionErrorCode::PermissionDenied.code(),
        "POSITION_UNAVAILABLE": PositionErrorCode::PositionUnavailable.code(),
        "TIMEOUT": PositionErrorCode::Timeout.code(),
    })
}

pub(super) fn position_json(position: &Position) -> Value {
    let coords = &position.coords;
    json!({
        "timestamp": position.timestamp.as_millisecond(),
        "coords": {
            "latitude": coords.latitude,
            "longitude": coords.longitude,
            "accuracy": coords.accuracy,
            "altitude": coords.altitude,
            "altitudeAccuracy": coords.altitude_accuracy,
            "heading": coords.heading,
            "speed": coords.speed,
        }
    })
}

fn clock(at: Timestamp, tz: &TimeZone) -> String {
    at.to_zoned(tz.clone()).strftime("%H:%M:%S").to_string()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indent(block: &str) -> String {
    block.replace('\n', "\n   ")
}
