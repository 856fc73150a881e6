//! Guild member entity built from member-list push fragments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GuildId, RoleId, User, UserId};
use crate::domain::errors::MemberError;

/// Online status reported in a member's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    #[serde(rename = "dnd")]
    DoNotDisturb,
    Invisible,
    #[default]
    Offline,
}

impl PresenceStatus {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "online" => Self::Online,
            "idle" => Self::Idle,
            "dnd" => Self::DoNotDisturb,
            "invisible" => Self::Invisible,
            _ => Self::Offline,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::DoNotDisturb => "dnd",
            Self::Invisible => "invisible",
            Self::Offline => "offline",
        }
    }

    #[must_use]
    pub const fn is_online(&self) -> bool {
        !matches!(self, Self::Offline | Self::Invisible)
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of client a member is connected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientDevice {
    Desktop,
    Mobile,
    Web,
    Embedded,
}

impl ClientDevice {
    /// Lookup order used when a member is active on several clients.
    pub const PRIORITY: [Self; 4] = [Self::Desktop, Self::Mobile, Self::Web, Self::Embedded];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Web => "web",
            Self::Embedded => "embedded",
        }
    }
}

impl std::fmt::Display for ClientDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence snapshot attached to a member-list entry.
///
/// Both parts are optional because the gateway omits them for some entries;
/// [`Member`] accessors report which part was missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presence {
    pub status: Option<PresenceStatus>,
    /// Active clients, ordered by [`ClientDevice::PRIORITY`].
    pub client_status: Option<Vec<ClientDevice>>,
}

/// A guild member as resolved by a member-list sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    guild_id: GuildId,
    user: Option<User>,
    nick: Option<String>,
    roles: Vec<RoleId>,
    joined_at: Option<DateTime<Utc>>,
    premium_since: Option<DateTime<Utc>>,
    presence: Option<Presence>,
}

impl Member {
    #[must_use]
    pub const fn new(guild_id: GuildId, user: Option<User>) -> Self {
        Self {
            guild_id,
            user,
            nick: None,
            roles: Vec::new(),
            joined_at: None,
            premium_since: None,
            presence: None,
        }
    }

    #[must_use]
    pub fn with_nick(mut self, nick: Option<String>) -> Self {
        self.nick = nick;
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<RoleId>) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub const fn with_joined_at(mut self, joined_at: Option<DateTime<Utc>>) -> Self {
        self.joined_at = joined_at;
        self
    }

    #[must_use]
    pub const fn with_premium_since(mut self, premium_since: Option<DateTime<Utc>>) -> Self {
        self.premium_since = premium_since;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: Option<Presence>) -> Self {
        self.presence = presence;
        self
    }

    /// Guild this member was fetched under.
    #[must_use]
    pub const fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// # Errors
    ///
    /// Returns `MemberError::MalformedData` if the fragment had no user object.
    pub fn user(&self) -> Result<&User, MemberError> {
        self.user.as_ref().ok_or(MemberError::missing("user"))
    }

    /// # Errors
    ///
    /// Returns `MemberError::MalformedData` if the fragment had no user object.
    pub fn id(&self) -> Result<UserId, MemberError> {
        self.user().map(User::id)
    }

    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &[RoleId] {
        &self.roles
    }

    #[must_use]
    pub const fn joined_at(&self) -> Option<DateTime<Utc>> {
        self.joined_at
    }

    #[must_use]
    pub const fn premium_since(&self) -> Option<DateTime<Utc>> {
        self.premium_since
    }

    #[must_use]
    pub const fn presence(&self) -> Option<&Presence> {
        self.presence.as_ref()
    }

    /// # Errors
    ///
    /// Returns `MemberError::MalformedData` if presence or its status is absent.
    pub fn status(&self) -> Result<PresenceStatus, MemberError> {
        self.require_presence()?
            .status
            .ok_or(MemberError::missing("presence.status"))
    }

    /// First active client in [`ClientDevice::PRIORITY`] order.
    ///
    /// # Errors
    ///
    /// Returns `MemberError::MalformedData` if presence is absent or lists no
    /// active client.
    pub fn device(&self) -> Result<ClientDevice, MemberError> {
        self.client_status()?
            .first()
            .copied()
            .ok_or(MemberError::missing("presence.client_status"))
    }

    /// # Errors
    ///
    /// Returns `MemberError::MalformedData` if presence or its client status
    /// is absent.
    pub fn on_mobile(&self) -> Result<bool, MemberError> {
        Ok(self.client_status()?.contains(&ClientDevice::Mobile))
    }

    /// Nickname if set, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.nick
            .as_deref()
            .or_else(|| self.user.as_ref().map(User::username))
    }

    fn require_presence(&self) -> Result<&Presence, MemberError> {
        self.presence.as_ref().ok_or(MemberError::missing("presence"))
    }

    fn client_status(&self) -> Result<&[ClientDevice], MemberError> {
        self.require_presence()?
            .client_status
            .as_deref()
            .ok_or(MemberError::missing("presence.client_status"))
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{user}"),
            None => write!(f, "<unknown member>"),
        }
    }
}
