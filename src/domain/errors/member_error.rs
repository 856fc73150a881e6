//! Member data error types.

use thiserror::Error;

/// Errors raised while building or reading a [`Member`](crate::domain::entities::Member).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum MemberError {
    /// A field a derived accessor depends on was absent from the fragment.
    #[error("malformed member data: missing {field}")]
    MalformedData { field: &'static str },

    /// The fragment could not be read as a member at all.
    #[error("invalid member fragment: {message}")]
    Invalid { message: String },
}

impl MemberError {
    /// Creates missing-field error.
    #[must_use]
    pub const fn missing(field: &'static str) -> Self {
        Self::MalformedData { field }
    }

    /// Creates invalid fragment error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
