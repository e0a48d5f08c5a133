//! Error types for the core crate.

use thiserror::Error;

/// Maximum length for value display in error messages.
const MAX_VALUE_DISPLAY_LEN: usize = 100;

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An encoding or decoding error occurred.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A value type mismatch occurred.
    #[error("type mismatch: expected {expected}, got {actual}{}", value_suffix(value.as_deref()))]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The actual type.
        actual: String,
        /// The value that caused the mismatch (truncated for display).
        value: Option<String>,
    },

    /// Index metadata is malformed or was used inconsistently.
    #[error("invalid index definition: {0}")]
    InvalidIndex(String),

    /// A spatial coordinate could not be mapped onto the curve.
    #[error("spatial error: {0}")]
    Spatial(String),
}

impl CoreError {
    /// Creates a type mismatch error without a value.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch { expected: expected.into(), actual: actual.into(), value: None }
    }

    /// Creates a type mismatch error carrying the offending value.
    ///
    /// The value is truncated to 100 characters for display.
    #[must_use]
    pub fn type_mismatch_with_value(
        expected: impl Into<String>,
        actual: impl Into<String>,
        value: impl std::fmt::Display,
    ) -> Self {
        let mut rendered = value.to_string();
        if rendered.len() > MAX_VALUE_DISPLAY_LEN {
            let mut cut = MAX_VALUE_DISPLAY_LEN;
            while !rendered.is_char_boundary(cut) {
                cut -= 1;
            }
            rendered.truncate(cut);
            rendered.push_str("...");
        }
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
            value: Some(rendered),
        }
    }
}

fn value_suffix(value: Option<&str>) -> String {
    value.map(|v| format!(" (value: {v})")).unwrap_or_default()
}
