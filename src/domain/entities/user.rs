//! Discord user entity, as carried inside member-list fragments.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(#[serde(with = "crate::domain::serde_utils::string_to_u64")] pub u64);

impl UserId {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

bitflags::bitflags! {
    /// Public badges shown on a user profile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct UserFlags: u64 {
        const STAFF = 1 << 0;
        const PARTNER = 1 << 1;
        const HYPESQUAD = 1 << 2;
        const BUG_HUNTER_LEVEL_1 = 1 << 3;
        const HYPESQUAD_BRAVERY = 1 << 6;
        const HYPESQUAD_BRILLIANCE = 1 << 7;
        const HYPESQUAD_BALANCE = 1 << 8;
        const PREMIUM_EARLY_SUPPORTER = 1 << 9;
        const TEAM_PSEUDO_USER = 1 << 10;
        const SYSTEM = 1 << 12;
        const BUG_HUNTER_LEVEL_2 = 1 << 14;
        const VERIFIED_BOT = 1 << 16;
        const VERIFIED_DEVELOPER = 1 << 17;
        const CERTIFIED_MODERATOR = 1 << 18;
        const BOT_HTTP_INTERACTIONS = 1 << 19;
        const ACTIVE_DEVELOPER = 1 << 22;
    }
}

/// Identity half of a guild member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    discriminator: String,
    avatar: Option<String>,
    bot: bool,
    public_flags: UserFlags,
}

impl User {
    #[must_use]
    pub fn new(
        id: impl Into<UserId>,
        username: impl Into<String>,
        discriminator: impl Into<String>,
        avatar: Option<String>,
        bot: bool,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            discriminator: discriminator.into(),
            avatar,
            bot,
            public_flags: UserFlags::empty(),
        }
    }

    #[must_use]
    pub const fn with_public_flags(mut self, flags: UserFlags) -> Self {
        self.public_flags = flags;
        self
    }

    #[must_use]
    pub const fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Avatar hash, not a URL.
    #[must_use]
    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    #[must_use]
    pub const fn is_bot(&self) -> bool {
        self.bot
    }

    #[must_use]
    pub const fn public_flags(&self) -> UserFlags {
        self.public_flags
    }

    /// `username#discriminator`, or the bare username for accounts migrated
    /// to unique usernames (discriminator `0`).
    #[must_use]
    pub fn tag(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_formats() {
        assert_eq!(User::new(1, "a", "0001", None, false).tag(), "a#0001");
        assert_eq!(User::new(1, "a", "0", None, false).tag(), "a");
    }

    #[test]
    fn test_public_flags() {
        let user = User::new(1, "bot", "0000", None, true)
            .with_public_flags(UserFlags::VERIFIED_BOT | UserFlags::ACTIVE_DEVELOPER);
        assert!(user.is_bot());
        assert!(user.public_flags().contains(UserFlags::VERIFIED_BOT));
        assert!(!user.public_flags().contains(UserFlags::STAFF));
    }
}
