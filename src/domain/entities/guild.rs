//! Discord guild identifier.

use serde::{Deserialize, Serialize};

/// Unique identifier for a Discord guild (server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(#[serde(with = "crate::domain::serde_utils::string_to_u64")] pub u64);

impl GuildId {
    /// Returns the underlying u64 value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GuildId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
