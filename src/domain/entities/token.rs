//! Gateway credential value object.

use std::fmt;

/// Opaque account token sent in the identify handshake.
///
/// `Debug` and `Display` only ever show a masked form.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
}

impl AuthToken {
    /// Creates a token from user input, rejecting empty values and values
    /// with embedded whitespace.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();

        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return None;
        }

        Some(Self { value })
    }

    /// Creates token without validation.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Returns token as string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns masked token for display. Counts characters, not bytes.
    #[must_use]
    pub fn masked(&self) -> String {
        let len = self.value.chars().count();
        if len <= 10 {
            return "*".repeat(len);
        }

        let visible_prefix: String = self.value.chars().take(4).collect();
        let visible_suffix: String = self.value.chars().skip(len - 4).collect();
        format!("{visible_prefix}...{visible_suffix}")
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &self.masked())
            .finish()
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}
