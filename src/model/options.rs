//! Position options: how a single location query should be answered.

use serde::{Deserialize, Serialize};

/// Options handed to the location capability for one query.
///
/// Every field is independently optional; `None` means "let the device
/// decide". Values are passed through untouched; a negative `timeout`
/// is the device's problem, not ours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionOptions {
    /// Ask for the most accurate fix the device can produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_high_accuracy: Option<bool>,

    /// Accept a cached position no older than this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_age: Option<i64>,

    /// Give up after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

impl PositionOptions {
    /// `true` only when high accuracy was explicitly requested.
    pub fn wants_high_accuracy(&self) -> bool {
        self.enable_high_accuracy == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_are_omitted_from_json() {
        let options = PositionOptions {
            timeout: Some(5000),
            ..PositionOptions::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"{"timeout":5000}"#);
    }

    #[test]
    fn deserializes_camel_case() {
        let options: PositionOptions =
            serde_json::from_str(r#"{"enableHighAccuracy":false,"maximumAge":-1}"#).unwrap();
        assert_eq!(options.enable_high_accuracy, Some(false));
        assert_eq!(options.maximum_age, Some(-1));
        assert_eq!(options.timeout, None);
        assert!(!options.wants_high_accuracy());
    }
}
