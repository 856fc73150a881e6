use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::codec::EventParser;
use super::constants::{EVENT_GUILD_MEMBER_LIST_UPDATE, EVENT_READY, GatewayOpcode};
use super::error::{GatewayError, GatewayResult};
use super::heartbeat::HeartbeatKeeper;
use super::payloads::{GatewayMessage, GatewayPayload};
use super::session::SessionShared;
use super::state::ConnectionState;
use crate::domain::entities::AuthToken;
use crate::domain::ports::ClientProperties;

const SYNC_OP: &str = "SYNC";

/// When the dispatcher sends identify on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifyTrigger {
    /// As soon as Hello arrives.
    #[default]
    Hello,
    /// On the first heartbeat ACK.
    FirstHeartbeatAck,
}

/// Everything needed to build the identify frame.
#[derive(Debug, Clone)]
pub struct IdentifyContext {
    token: AuthToken,
    properties: ClientProperties,
}

impl IdentifyContext {
    #[must_use]
    pub const fn new(token: AuthToken, properties: ClientProperties) -> Self {
        Self { token, properties }
    }

    #[must_use]
    pub const fn properties(&self) -> &ClientProperties {
        &self.properties
    }

    /// Encodes the identify frame if this session has not sent one yet.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::SerializationError` if encoding fails.
    pub fn claim_frame(&self, shared: &SessionShared) -> GatewayResult<Option<String>> {
        if !shared.with_info(|info| info.claim_identify()) {
            return Ok(None);
        }

        info!(token = %self.token, os = %self.properties.os, "Sending identify");
        GatewayPayload::identify(&self.token, &self.properties)
            .encode()
            .map(Some)
    }
}

type OpcodeHandler = fn(&mut EventDispatcher, GatewayMessage) -> GatewayResult<()>;
type EventHandler = fn(&mut EventDispatcher, Option<Value>) -> GatewayResult<()>;

/// Routes inbound frames through explicit opcode and event-name tables.
///
/// Handlers never touch the transport; frames they need written go to an
/// outbox that [`EventDispatcher::dispatch`] hands back to the caller.
pub struct EventDispatcher {
    shared: Arc<SessionShared>,
    heartbeat: HeartbeatKeeper,
    identify: IdentifyContext,
    trigger: IdentifyTrigger,
    opcodes: HashMap<GatewayOpcode, OpcodeHandler>,
    events: HashMap<&'static str, EventHandler>,
    outbox: Vec<String>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(
        shared: Arc<SessionShared>,
        heartbeat: HeartbeatKeeper,
        identify: IdentifyContext,
        trigger: IdentifyTrigger,
    ) -> Self {
        let opcodes = HashMap::from([
            (GatewayOpcode::Dispatch, Self::on_dispatch as OpcodeHandler),
            (GatewayOpcode::Heartbeat, Self::on_heartbeat_request as OpcodeHandler),
            (GatewayOpcode::Reconnect, Self::on_reconnect as OpcodeHandler),
            (GatewayOpcode::InvalidSession, Self::on_invalid_session as OpcodeHandler),
            (GatewayOpcode::Hello, Self::on_hello as OpcodeHandler),
            (GatewayOpcode::HeartbeatAck, Self::on_heartbeat_ack as OpcodeHandler),
        ]);

        let events = HashMap::from([
            (EVENT_READY, Self::on_ready as EventHandler),
            (
                EVENT_GUILD_MEMBER_LIST_UPDATE,
                Self::on_member_list_update as EventHandler,
            ),
        ]);

        Self {
            shared,
            heartbeat,
            identify,
            trigger,
            opcodes,
            events,
            outbox: Vec::new(),
        }
    }

    /// Handles one raw text frame and returns the frames to write in reply.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for malformed frames, unknown opcodes or
    /// unparsable handshake payloads, and a connection error when the gateway
    /// asks to reconnect or invalidates the session.
    pub fn dispatch(&mut self, raw: &str) -> GatewayResult<Vec<String>> {
        let message = EventParser::parse_message(raw)?;
        self.shared.update_sequence(message.s);

        let handler = GatewayOpcode::from_u8(message.op)
            .and_then(|opcode| self.opcodes.get(&opcode).copied())
            .ok_or(GatewayError::UnexpectedOpcode { opcode: message.op })?;

        handler(self, message)?;
        Ok(std::mem::take(&mut self.outbox))
    }

    pub async fn stop_heartbeat(&self) {
        self.heartbeat.stop().await;
    }

    fn on_dispatch(&mut self, message: GatewayMessage) -> GatewayResult<()> {
        let event = message
            .t
            .ok_or_else(|| GatewayError::protocol("dispatch without event name"))?;

        match self.events.get(event.as_str()).copied() {
            Some(handler) => {
                debug!(event = %event, sequence = ?message.s, "Dispatching event");
                handler(self, message.d)
            }
            None => {
                trace!(event = %event, "Ignoring dispatch event");
                Ok(())
            }
        }
    }

    fn on_hello(&mut self, message: GatewayMessage) -> GatewayResult<()> {
        let state = self.shared.connection_state();
        if state != ConnectionState::AwaitingHello {
            return Err(GatewayError::protocol(format!("unexpected Hello in state {state}")));
        }

        let hello = EventParser::parse_hello(message.d)?;
        let interval = Duration::from_millis(hello.heartbeat_interval);
        debug!(interval_ms = hello.heartbeat_interval, "Received Hello");

        self.shared.with_state(|s| s.set_heartbeat_interval(interval));
        self.shared.transition(ConnectionState::Identifying);
        self.heartbeat.start(interval);

        if self.trigger == IdentifyTrigger::Hello {
            self.queue_identify()?;
        }
        Ok(())
    }

    fn on_heartbeat_ack(&mut self, _message: GatewayMessage) -> GatewayResult<()> {
        let latency = self.shared.with_state(|s| {
            s.record_heartbeat_ack();
            s.latency_ms()
        });
        trace!(latency_ms = ?latency, "Heartbeat acknowledged");

        if !self.shared.is_identified() {
            self.queue_identify()?;
        }
        Ok(())
    }

    fn on_heartbeat_request(&mut self, _message: GatewayMessage) -> GatewayResult<()> {
        let sequence = self.shared.heartbeat_sequence();
        debug!(sequence = ?sequence, "Gateway requested immediate heartbeat");
        self.outbox.push(GatewayPayload::heartbeat(sequence).encode()?);
        Ok(())
    }

    fn on_reconnect(&mut self, _message: GatewayMessage) -> GatewayResult<()> {
        info!("Gateway requested reconnect");
        Err(GatewayError::ConnectionClosed {
            code: 4000,
            reason: "Reconnect requested".to_string(),
        })
    }

    fn on_invalid_session(&mut self, message: GatewayMessage) -> GatewayResult<()> {
        let resumable = message.d.and_then(|d| d.as_bool()).unwrap_or(false);
        warn!(resumable = resumable, "Session invalidated");
        Err(GatewayError::SessionInvalidated { resumable })
    }

    fn on_ready(&mut self, data: Option<Value>) -> GatewayResult<()> {
        let ready = EventParser::parse_ready(data)?;
        let user_id = ready.user.map(|u| u.id);

        if !self
            .shared
            .with_info(|info| info.mark_identified(ready.session_id, user_id))
        {
            debug!("Duplicate READY ignored");
            return Ok(());
        }

        self.shared.transition(ConnectionState::Ready);
        info!(user_id = ?user_id, "Gateway ready");
        Ok(())
    }

    fn on_member_list_update(&mut self, data: Option<Value>) -> GatewayResult<()> {
        let update = EventParser::parse_member_list_update(data)?;

        let Some(guild_id) = self.shared.collecting_for() else {
            trace!("Member list update with no fetch in flight");
            return Ok(());
        };
        if update.guild_id.is_some_and(|id| id != guild_id) {
            debug!(guild_id = ?update.guild_id, "Member list update for another guild");
            return Ok(());
        }

        let mut members = Vec::new();
        for op in update.ops.into_iter().filter(|op| op.op == SYNC_OP) {
            for fragment in op.items.into_iter().filter_map(|item| item.member) {
                match EventParser::parse_member(&fragment, guild_id) {
                    Ok(member) => members.push(member),
                    Err(e) => warn!(error = %e, "Skipping member fragment"),
                }
            }
        }

        let added = members.len();
        if let Some(total) = self.shared.push_members(guild_id, members) {
            debug!(guild_id = %guild_id, count = added, total = total, "Collected members");
        }
        Ok(())
    }

    fn queue_identify(&mut self) -> GatewayResult<()> {
        if let Some(frame) = self.identify.claim_frame(&self.shared)? {
            self.outbox.push(frame);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{GuildId, UserId};
    use crate::infrastructure::discord::gateway::connection::{OutboundFrame, outbound_channel};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        dispatcher: EventDispatcher,
        shared: Arc<SessionShared>,
        heartbeat: HeartbeatKeeper,
        outbound: mpsc::Receiver<OutboundFrame>,
    }

    fn fixture(trigger: IdentifyTrigger) -> Fixture {
        let shared = Arc::new(SessionShared::new());
        shared.transition(ConnectionState::Connecting);
        shared.transition(ConnectionState::AwaitingHello);

        let (sender, outbound) = outbound_channel();
        let heartbeat = HeartbeatKeeper::new(shared.clone(), sender);
        let identify = IdentifyContext::new(
            AuthToken::new_unchecked("token-value"),
            ClientProperties::new("Windows", "Firefox", "Other"),
        );
        let dispatcher =
            EventDispatcher::new(shared.clone(), heartbeat.clone(), identify, trigger);

        Fixture {
            dispatcher,
            shared,
            heartbeat,
            outbound,
        }
    }

    fn frame(value: &Value) -> String {
        value.to_string()
    }

    fn op(text: &str) -> u64 {
        serde_json::from_str::<Value>(text).unwrap()["op"]
            .as_u64()
            .unwrap()
    }

    fn hello() -> String {
        frame(&json!({"op": 10, "d": {"heartbeat_interval": 41250}}))
    }

    fn ready(seq: u64) -> String {
        frame(&json!({
            "op": 0, "s": seq, "t": "READY",
            "d": {"session_id": "abc", "user": {"id": "77"}, "guilds": []}
        }))
    }

    fn member(id: &str) -> Value {
        json!({"member": {"user": {"id": id, "username": format!("user{id}")}, "roles": []}})
    }

    #[tokio::test(start_paused = true)]
    async fn test_hello_identifies_and_starts_heartbeat() {
        let mut fx = fixture(IdentifyTrigger::Hello);

        let replies = fx.dispatcher.dispatch(&hello()).unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(op(&replies[0]), 2);
        assert_eq!(fx.shared.connection_state(), ConnectionState::Identifying);
        assert_eq!(
            fx.shared.heartbeat_interval(),
            Some(Duration::from_millis(41250))
        );

        let beat = fx.outbound.recv().await.unwrap();
        assert_eq!(op(&beat.text), 1);
        fx.heartbeat.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_on_first_ack_only_once() {
        let mut fx = fixture(IdentifyTrigger::FirstHeartbeatAck);

        assert!(fx.dispatcher.dispatch(&hello()).unwrap().is_empty());

        let first = fx.dispatcher.dispatch(r#"{"op":11}"#).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(op(&first[0]), 2);

        assert!(fx.dispatcher.dispatch(r#"{"op":11}"#).unwrap().is_empty());
        fx.heartbeat.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_marks_identified() {
        let mut fx = fixture(IdentifyTrigger::Hello);
        fx.dispatcher.dispatch(&hello()).unwrap();

        fx.dispatcher.dispatch(&ready(1)).unwrap();

        assert!(fx.shared.is_identified());
        assert_eq!(fx.shared.sequence(), Some(1));
        assert_eq!(fx.shared.connection_state(), ConnectionState::Ready);
        fx.shared.with_info(|info| {
            assert_eq!(info.session_id(), Some("abc"));
            assert_eq!(info.user_id(), Some(UserId(77)));
        });
        fx.heartbeat.stop().await;
    }

    #[test]
    fn test_sequence_recorded_for_ignored_events() {
        let mut fx = fixture(IdentifyTrigger::Hello);

        fx.dispatcher
            .dispatch(r#"{"op":0,"s":42,"t":"TYPING_START","d":{}}"#)
            .unwrap();

        assert_eq!(fx.shared.sequence(), Some(42));
    }

    #[test]
    fn test_unknown_opcode_is_protocol_error() {
        let mut fx = fixture(IdentifyTrigger::Hello);

        let err = fx.dispatcher.dispatch(r#"{"op":99,"d":null}"#).unwrap_err();

        assert!(matches!(err, GatewayError::UnexpectedOpcode { opcode: 99 }));
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_malformed_frame_is_protocol_error() {
        let mut fx = fixture(IdentifyTrigger::Hello);
        assert!(fx.dispatcher.dispatch("{oops").unwrap_err().is_protocol_error());
    }

    #[test]
    fn test_reconnect_and_invalid_session_are_fatal() {
        let mut fx = fixture(IdentifyTrigger::Hello);

        let err = fx.dispatcher.dispatch(r#"{"op":7,"d":null}"#).unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionClosed { code: 4000, .. }));

        let err = fx.dispatcher.dispatch(r#"{"op":9,"d":false}"#).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::SessionInvalidated { resumable: false }
        ));
    }

    #[test]
    fn test_heartbeat_request_replies_with_sequence() {
        let mut fx = fixture(IdentifyTrigger::Hello);
        fx.shared.update_sequence(Some(5));

        let replies = fx.dispatcher.dispatch(r#"{"op":1,"d":null}"#).unwrap();

        assert_eq!(
            serde_json::from_str::<Value>(&replies[0]).unwrap(),
            json!({"op": 1, "d": 5})
        );
    }

    #[test]
    fn test_member_list_update_collects_sync_items() {
        let mut fx = fixture(IdentifyTrigger::Hello);
        fx.shared.register_collector(GuildId(1)).unwrap();

        let update = json!({
            "op": 0, "s": 3, "t": "GUILD_MEMBER_LIST_UPDATE",
            "d": {
                "guild_id": "1",
                "ops": [
                    {"op": "SYNC", "range": [0, 99], "items": [
                        {"group": {"id": "online", "count": 2}},
                        member("10"),
                        {"member": {"roles": "broken"}},
                        member("11")
                    ]},
                    {"op": "INSERT", "index": 0, "item": member("12")}
                ]
            }
        });
        fx.dispatcher.dispatch(&frame(&update)).unwrap();

        let members = fx.shared.take_collector().unwrap().into_members();
        let ids: Vec<_> = members.iter().map(|m| m.id().unwrap()).collect();
        assert_eq!(ids, vec![UserId(10), UserId(11)]);
    }

    #[test]
    fn test_member_list_update_for_other_guild_ignored() {
        let mut fx = fixture(IdentifyTrigger::Hello);
        fx.shared.register_collector(GuildId(1)).unwrap();

        let update = json!({
            "op": 0, "t": "GUILD_MEMBER_LIST_UPDATE",
            "d": {"guild_id": "2", "ops": [{"op": "SYNC", "items": [member("10")]}]}
        });
        fx.dispatcher.dispatch(&frame(&update)).unwrap();

        assert!(fx.shared.take_collector().unwrap().into_members().is_empty());
    }

    #[test]
    fn test_hello_outside_handshake_rejected() {
        let mut fx = fixture(IdentifyTrigger::Hello);
        fx.shared.transition(ConnectionState::Identifying);

        assert!(fx.dispatcher.dispatch(&hello()).unwrap_err().is_protocol_error());
    }
}
