//! The options form: editable query options, snapshotted per query.
//!
//! Field names and parsing follow the position-options form the harness
//! grew out of: `enableHighAccuracy` is a tri-state select, `maximumAge`
//! and `timeout` are number inputs where an empty value means "unset".

use std::cell::RefCell;

use crate::model::PositionOptions;

/// Hands out a fresh options value for each query.
///
/// The returned value is owned by the caller; later edits to the provider
/// never reach a query that was already issued.
pub trait OptionsProvider {
    fn snapshot(&self) -> PositionOptions;
}

impl OptionsProvider for PositionOptions {
    fn snapshot(&self) -> PositionOptions {
        *self
    }
}

/// Errors from editing a form field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{field} must be an integer, got {value:?}")]
    NotAnInteger { field: &'static str, value: String },
}

/// Editable options, addressed by field name.
#[derive(Debug, Default)]
pub struct OptionsForm {
    values: RefCell<PositionOptions>,
}

impl OptionsForm {
    pub const ENABLE_HIGH_ACCURACY: &'static str = "enableHighAccuracy";
    pub const MAXIMUM_AGE: &'static str = "maximumAge";
    pub const TIMEOUT: &'static str = "timeout";

    pub fn new(initial: PositionOptions) -> Self {
        Self {
            values: RefCell::new(initial),
        }
    }

    /// Set one field from raw input.
    ///
    /// Returns `Ok(false)` for field names the form does not know; they
    /// are ignored. Integers are not range-checked.
    pub fn set_field(&self, name: &str, raw: &str) -> Result<bool, FormError> {
        let raw = raw.trim();
        let mut values = self.values.borrow_mut();
        match name {
            Self::ENABLE_HIGH_ACCURACY => {
                values.enable_high_accuracy = (!raw.is_empty()).then(|| raw == "true");
            }
            Self::MAXIMUM_AGE => values.maximum_age = parse_integer(Self::MAXIMUM_AGE, raw)?,
            Self::TIMEOUT => values.timeout = parse_integer(Self::TIMEOUT, raw)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Apply `name=value` pairs in order, stopping at the first error.
    pub fn apply<'a>(
        &self,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), FormError> {
        for (name, raw) in fields {
            self.set_field(name, raw)?;
        }
        Ok(())
    }
}

impl OptionsProvider for OptionsForm {
    fn snapshot(&self) -> PositionOptions {
        *self.values.borrow()
    }
}

fn parse_integer(field: &'static str, raw: &str) -> Result<Option<i64>, FormError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| FormError::NotAnInteger {
        field,
        value: raw.to_string(),
    })
}
