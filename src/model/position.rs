//! Position fixes and the errors a device reports instead of one.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A single location fix reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub coords: Coordinates,

    /// When the device captured the fix.
    pub timestamp: Timestamp,
}

/// Where the device is, and how sure it is about that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,

    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,

    /// Meters above the WGS84 ellipsoid.
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,

    /// Degrees clockwise from true north.
    pub heading: Option<f64>,

    /// Meters per second.
    pub speed: Option<f64>,
}

/// Why a device could not produce a fix.
///
/// Numeric values match what location platforms report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionErrorCode {
    PermissionDenied = 1,
    PositionUnavailable = 2,
    Timeout = 3,
}

impl PositionErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::PositionUnavailable => "position_unavailable",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for PositionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device-reported failure for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionError {
    pub code: PositionErrorCode,
    pub message: String,
}

impl PositionError {
    pub fn new(code: PositionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error a device reports for `code` when it has nothing more to say.
    pub fn from_code(code: PositionErrorCode) -> Self {
        match code {
            PositionErrorCode::PermissionDenied => Self::permission_denied(),
            PositionErrorCode::PositionUnavailable => Self::unavailable(),
            PositionErrorCode::Timeout => Self::timeout(),
        }
    }

    pub fn permission_denied() -> Self {
        Self::new(PositionErrorCode::PermissionDenied, "User denied Geolocation")
    }

    pub fn unavailable() -> Self {
        Self::new(PositionErrorCode::PositionUnavailable, "Position unavailable")
    }

    pub fn timeout() -> Self {
        Self::new(PositionErrorCode::Timeout, "Timeout expired")
    }
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.code.code(), self.message)
    }
}
