use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::error::{GatewayError, GatewayResult};
use super::payloads::{
    GatewayMessage, HelloPayload, MemberListUpdatePayload, MemberPayload, PresencePayload,
    ReadyPayload,
};
use crate::domain::entities::{ClientDevice, GuildId, Member, Presence, PresenceStatus, User, UserFlags};
use crate::domain::errors::MemberError;

/// Decoders for inbound gateway frames.
pub struct EventParser;

impl EventParser {
    /// Decodes a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ProtocolError` if the frame is not JSON or has
    /// no numeric `op`.
    pub fn parse_message(json: &str) -> GatewayResult<GatewayMessage> {
        serde_json::from_str(json).map_err(|e| GatewayError::protocol(format!("malformed frame: {e}")))
    }

    /// Decodes the body of a Hello (op 10).
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ProtocolError` if the body is missing or lacks
    /// `heartbeat_interval`.
    pub fn parse_hello(data: Option<Value>) -> GatewayResult<HelloPayload> {
        let data = data.ok_or_else(|| GatewayError::protocol("Hello missing data"))?;
        serde_json::from_value(data)
            .map_err(|e| GatewayError::protocol(format!("Failed to parse Hello: {e}")))
    }

    /// Decodes the body of a READY dispatch.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ProtocolError` if the body is missing or
    /// malformed.
    pub fn parse_ready(data: Option<Value>) -> GatewayResult<ReadyPayload> {
        let data = data.ok_or_else(|| GatewayError::protocol("Ready missing data"))?;
        serde_json::from_value(data)
            .map_err(|e| GatewayError::protocol(format!("Failed to parse Ready: {e}")))
    }

    /// Decodes the body of a `GUILD_MEMBER_LIST_UPDATE` dispatch. Member
    /// fragments stay raw for [`EventParser::parse_member`].
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ProtocolError` if the body is missing or
    /// malformed.
    pub fn parse_member_list_update(data: Option<Value>) -> GatewayResult<MemberListUpdatePayload> {
        let data = data.ok_or_else(|| GatewayError::protocol("Member list update missing data"))?;
        serde_json::from_value(data).map_err(|e| {
            GatewayError::protocol(format!("Failed to parse GuildMemberListUpdate: {e}"))
        })
    }

    /// Builds a [`Member`] from one `item.member` fragment.
    ///
    /// Missing `user` or `presence` is tolerated here; the member's derived
    /// accessors report it when used.
    ///
    /// # Errors
    ///
    /// Returns `MemberError::Invalid` if the fragment has the wrong shape or
    /// carries an unparsable timestamp.
    pub fn parse_member(fragment: &Value, guild_id: GuildId) -> Result<Member, MemberError> {
        let payload = MemberPayload::deserialize_fragment(fragment)?;

        let user = payload.user.map(|u| {
            User::new(u.id, u.username, u.discriminator, u.avatar, u.bot)
                .with_public_flags(UserFlags::from_bits_truncate(u.public_flags))
        });

        Ok(Member::new(guild_id, user)
            .with_nick(payload.nick)
            .with_roles(payload.roles)
            .with_joined_at(parse_timestamp(payload.joined_at.as_deref(), "joined_at")?)
            .with_premium_since(parse_timestamp(
                payload.premium_since.as_deref(),
                "premium_since",
            )?)
            .with_presence(payload.presence.map(Self::convert_presence)))
    }

    fn convert_presence(payload: PresencePayload) -> Presence {
        Presence {
            status: payload.status.as_deref().map(PresenceStatus::parse),
            client_status: payload.client_status.as_ref().map(active_devices),
        }
    }
}

impl MemberPayload {
    fn deserialize_fragment(fragment: &Value) -> Result<Self, MemberError> {
        serde_json::from_value(fragment.clone()).map_err(|e| MemberError::invalid(e.to_string()))
    }
}

fn parse_timestamp(
    value: Option<&str>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, MemberError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| MemberError::invalid(format!("{field}: {e}")))
        })
        .transpose()
}

/// A client counts as active when its entry is present and not `null` or
/// `false`.
fn active_devices(client_status: &Map<String, Value>) -> Vec<ClientDevice> {
    ClientDevice::PRIORITY
        .into_iter()
        .filter(|device| {
            client_status
                .get(device.as_str())
                .is_some_and(|v| !v.is_null() && v.as_bool() != Some(false))
        })
        .collect()
}
