use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::constants::{GatewayOpcode, IDENTIFY_VERSION, LARGE_THRESHOLD};
use super::error::{GatewayError, GatewayResult};
use super::ranges::RangeGroup;
use crate::domain::entities::{AuthToken, ChannelId, GuildId, RoleId, UserId};
use crate::domain::ports::ClientProperties;

/// Outbound frame: an opcode plus its typed body.
#[derive(Debug, Serialize)]
pub struct GatewayPayload<D> {
    /// Opcode.
    pub op: u8,
    /// Body.
    pub d: D,
}

impl<D: Serialize> GatewayPayload<D> {
    /// Encodes the payload as one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::SerializationError` if the body cannot be
    /// represented as JSON.
    pub fn encode(&self) -> GatewayResult<String> {
        serde_json::to_string(self).map_err(|e| GatewayError::serialization(e.to_string()))
    }
}

impl GatewayPayload<Option<u64>> {
    /// Heartbeat (op 1) carrying the last sequence, or `null` before any
    /// dispatch.
    #[must_use]
    pub const fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: GatewayOpcode::Heartbeat.as_u8(),
            d: sequence,
        }
    }
}

impl GatewayPayload<IdentifyData> {
    /// Identify (op 2) for a user account.
    #[must_use]
    pub fn identify(token: &AuthToken, properties: &ClientProperties) -> Self {
        let properties = IdentifyProperties {
            os: properties.os.clone(),
            browser: properties.browser.clone(),
            device: properties.device.clone(),
            referrer: String::new(),
            referring_domain: String::new(),
        };

        Self {
            op: GatewayOpcode::Identify.as_u8(),
            d: IdentifyData {
                token: token.as_str().to_string(),
                properties,
                compress: false,
                large_threshold: LARGE_THRESHOLD,
                v: IDENTIFY_VERSION,
            },
        }
    }
}

impl GatewayPayload<LazyRequestData> {
    /// Creates a `LazyRequest` (Opcode 14) asking for the same ranges in every
    /// listed channel of a guild.
    #[must_use]
    pub fn member_list_request(
        guild_id: GuildId,
        channel_ids: &[ChannelId],
        ranges: &RangeGroup,
        options: LazyRequestOptions,
    ) -> Self {
        let channels = channel_ids
            .iter()
            .map(|channel_id| (channel_id.to_string(), *ranges))
            .collect();

        Self {
            op: GatewayOpcode::LazyRequest.as_u8(),
            d: LazyRequestData {
                guild_id,
                channels,
                activities: options.activities,
                typing: options.typing,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentifyData {
    token: String,
    properties: IdentifyProperties,
    compress: bool,
    large_threshold: u16,
    v: u8,
}

#[derive(Debug, Serialize)]
struct IdentifyProperties {
    #[serde(rename = "$os")]
    os: String,
    #[serde(rename = "$browser")]
    browser: String,
    #[serde(rename = "$device")]
    device: String,
    #[serde(rename = "$referrer")]
    referrer: String,
    #[serde(rename = "$referring_domain")]
    referring_domain: String,
}

/// Subscription flags sent alongside a member-list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyRequestOptions {
    /// Ask for member activities.
    pub activities: bool,
    /// Ask for typing events.
    pub typing: bool,
}

impl Default for LazyRequestOptions {
    fn default() -> Self {
        Self {
            activities: false,
            typing: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LazyRequestData {
    guild_id: GuildId,
    channels: BTreeMap<String, RangeGroup>,
    activities: bool,
    typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReadyPayload {
    pub session_id: Option<String>,
    pub user: Option<ReadyUser>,
}

#[derive(Debug, Deserialize)]
pub struct ReadyUser {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MemberListUpdatePayload {
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub ops: Vec<MemberListOpPayload>,
}

#[derive(Debug, Deserialize)]
pub struct MemberListOpPayload {
    pub op: String,
    #[serde(default)]
    pub items: Vec<MemberListItemPayload>,
}

/// Entries are either a member or a role group header. Members stay raw so
/// one bad fragment does not poison the rest of the batch.
#[derive(Debug, Deserialize)]
pub struct MemberListItemPayload {
    pub member: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MemberPayload {
    pub user: Option<UserPayload>,
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    pub joined_at: Option<String>,
    pub premium_since: Option<String>,
    pub presence: Option<PresencePayload>,
}

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub public_flags: u64,
}

#[derive(Debug, Deserialize)]
pub struct PresencePayload {
    pub status: Option<String>,
    pub client_status: Option<Map<String, Value>>,
}
