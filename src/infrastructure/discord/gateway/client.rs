use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};

use super::connection::{
    ConnectionDriver, GatewayConnection, OutboundSender, WebSocketConnection, outbound_channel,
};
use super::constants::{
    GATEWAY_URL, HELLO_TIMEOUT, MEMBER_REQUEST_DELAY, MEMBER_SETTLE_DELAY_MAX,
    MEMBER_SETTLE_DELAY_MIN, READY_TIMEOUT,
};
use super::dispatcher::{EventDispatcher, IdentifyContext, IdentifyTrigger};
use super::error::{GatewayError, GatewayResult};
use super::heartbeat::HeartbeatKeeper;
use super::payloads::{GatewayPayload, LazyRequestOptions};
use super::proxy::ProxyConfig;
use super::ranges::plan_ranges;
use super::session::{MemberCollector, SessionShared};
use super::state::ConnectionState;
use crate::domain::entities::{AuthToken, ChannelId, GuildId, Member};
use crate::domain::ports::{ClientProperties, UserAgentParser};
use crate::infrastructure::discord::user_agent::RegexUserAgentParser;

/// Settings of a [`GatewaySession`].
#[derive(Debug, Clone)]
pub struct GatewaySessionConfig {
    /// WebSocket URL of the gateway.
    pub gateway_url: String,
    /// Sent as the `User-Agent` header and parsed into identify properties.
    pub user_agent: Option<String>,
    /// HTTP proxy the connection is tunneled through.
    pub proxy: Option<ProxyConfig>,
    /// When identify is sent.
    pub identify_trigger: IdentifyTrigger,
    /// How long `connect` waits for READY.
    pub ready_timeout: Duration,
    /// Receive deadline before Hello announces the heartbeat interval.
    pub hello_timeout: Duration,
    /// Pause after each member-list request.
    pub request_delay: Duration,
    /// Lower bound of the randomized wait after the last request.
    pub settle_delay_min: Duration,
    /// Upper bound of the randomized wait after the last request.
    pub settle_delay_max: Duration,
}

impl Default for GatewaySessionConfig {
    fn default() -> Self {
        Self {
            gateway_url: GATEWAY_URL.to_string(),
            user_agent: None,
            proxy: None,
            identify_trigger: IdentifyTrigger::default(),
            ready_timeout: READY_TIMEOUT,
            hello_timeout: HELLO_TIMEOUT,
            request_delay: MEMBER_REQUEST_DELAY,
            settle_delay_min: MEMBER_SETTLE_DELAY_MIN,
            settle_delay_max: MEMBER_SETTLE_DELAY_MAX,
        }
    }
}

impl GatewaySessionConfig {
    /// Default settings: Discord's gateway, no user agent, no proxy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the gateway URL.
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Sets the `User-Agent`; `None` falls back to platform identify
    /// properties and no header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Tunnels the connection through an HTTP proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Chooses when identify is sent.
    #[must_use]
    pub const fn with_identify_trigger(mut self, trigger: IdentifyTrigger) -> Self {
        self.identify_trigger = trigger;
        self
    }

    /// How long `connect` waits for READY.
    #[must_use]
    pub const fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Receive deadline before Hello.
    #[must_use]
    pub const fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Pause after each member-list request.
    #[must_use]
    pub const fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Bounds of the randomized wait after the last request. Swapped if given
    /// in the wrong order.
    #[must_use]
    pub fn with_settle_delay(mut self, min: Duration, max: Duration) -> Self {
        self.settle_delay_min = min.min(max);
        self.settle_delay_max = max.max(min);
        self
    }
}

/// One gateway connection used to fetch guild member lists.
///
/// `connect` blocks until READY; `fetch_members` then sends paginated
/// member-list requests and returns what the gateway pushed back. The session
/// does not reconnect: once it fails or closes it stays unusable.
pub struct GatewaySession {
    config: GatewaySessionConfig,
    identify: IdentifyContext,
    shared: Arc<SessionShared>,
    connection: Option<Box<dyn GatewayConnection>>,
    outbound: Option<OutboundSender>,
    heartbeat: Option<HeartbeatKeeper>,
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl GatewaySession {
    /// Builds a session over a WebSocket transport, deriving identify
    /// properties from the configured user agent.
    #[must_use]
    pub fn new(token: AuthToken, config: GatewaySessionConfig) -> Self {
        Self::with_parts(
            token,
            config,
            Box::new(WebSocketConnection::new()),
            &RegexUserAgentParser::new(),
        )
    }

    /// Builds a session over a caller-supplied transport and user-agent
    /// parser.
    #[must_use]
    pub fn with_parts(
        token: AuthToken,
        config: GatewaySessionConfig,
        connection: Box<dyn GatewayConnection>,
        parser: &dyn UserAgentParser,
    ) -> Self {
        let properties = config
            .user_agent
            .as_deref()
            .map_or_else(ClientProperties::platform_default, |ua| parser.parse(ua));

        Self {
            config,
            identify: IdentifyContext::new(token, properties),
            shared: Arc::new(SessionShared::new()),
            connection: Some(connection),
            outbound: None,
            heartbeat: None,
            shutdown: Arc::new(Notify::new()),
            task: None,
        }
    }

    /// Opens the transport, starts the connection task and waits for READY.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::AlreadyConnected` if the session was already
    /// started, `GatewayError::Timeout` if READY does not arrive in time, and
    /// the transport or session failure otherwise.
    pub async fn connect(&mut self) -> GatewayResult<()> {
        if self.shared.connection_state() != ConnectionState::Disconnected {
            return Err(GatewayError::AlreadyConnected);
        }
        let mut connection = self
            .connection
            .take()
            .ok_or(GatewayError::AlreadyConnected)?;

        self.shared.transition(ConnectionState::Connecting);
        info!(url = %self.config.gateway_url, "Connecting to gateway");

        if let Err(e) = connection
            .connect(
                &self.config.gateway_url,
                self.config.user_agent.as_deref(),
                self.config.proxy.as_ref(),
            )
            .await
        {
            self.shared.fail(e.to_string());
            return Err(e);
        }
        self.shared.transition(ConnectionState::AwaitingHello);

        let (outbound, outbound_rx) = outbound_channel();
        let heartbeat = HeartbeatKeeper::new(self.shared.clone(), outbound.clone());
        let dispatcher = EventDispatcher::new(
            self.shared.clone(),
            heartbeat.clone(),
            self.identify.clone(),
            self.config.identify_trigger,
        );
        let driver = ConnectionDriver::new(
            connection,
            dispatcher,
            self.shared.clone(),
            outbound_rx,
            self.shutdown.clone(),
            self.config.hello_timeout,
        );

        self.task = Some(spawn_driver(driver, self.shared.clone()));
        self.outbound = Some(outbound);
        self.heartbeat = Some(heartbeat);

        if let Err(e) = self.wait_ready().await {
            self.stop_task().await;
            return Err(e);
        }
        Ok(())
    }

    async fn wait_ready(&self) -> GatewayResult<()> {
        let mut state_rx = self.shared.subscribe();
        let reached = timeout(
            self.config.ready_timeout,
            state_rx.wait_for(|s| s.is_ready() || s.is_terminal()),
        )
        .await;

        let state = match reached {
            Ok(Ok(state)) => *state,
            Ok(Err(_)) => return Err(GatewayError::session_failed("state channel closed")),
            Err(_) => {
                let err = GatewayError::timeout("READY");
                self.shared.fail(err.to_string());
                return Err(err);
            }
        };

        if state.is_ready() {
            info!("Gateway session ready");
            return Ok(());
        }
        self.shared.ensure_usable()?;
        Err(GatewayError::session_failed("session ended before READY"))
    }

    /// Sends identify unless this session already sent one.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotConnected` before `connect`, the session
    /// failure once the session is unusable, and `GatewayError::SendFailed`
    /// if the transport rejects the frame.
    pub async fn identify(&self) -> GatewayResult<()> {
        self.shared.ensure_usable()?;
        let outbound = self.outbound.as_ref().ok_or(GatewayError::NotConnected)?;

        match self.identify.claim_frame(&self.shared)? {
            Some(frame) => outbound.send_confirmed(frame).await,
            None => {
                debug!("Identify already sent");
                Ok(())
            }
        }
    }

    /// Requests the member list of `channel_id` in pages of
    /// `RANGES_PER_REQUEST` ranges until `max_count` is covered, then returns
    /// the members pushed back, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotIdentified` before READY,
    /// `GatewayError::FetchInProgress` while another fetch runs,
    /// `GatewayError::SendFailed` if a request cannot be written, and the
    /// session failure if the session fails before or during the fetch.
    pub async fn fetch_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        max_count: u64,
    ) -> GatewayResult<Vec<Member>> {
        self.shared.ensure_usable()?;
        if !self.shared.is_identified() {
            return Err(GatewayError::NotIdentified);
        }
        let outbound = self.outbound.as_ref().ok_or(GatewayError::NotConnected)?;

        self.shared.register_collector(guild_id)?;
        let guard = CollectorGuard {
            shared: &self.shared,
        };

        let result = self
            .request_pages(outbound, guild_id, channel_id, max_count)
            .await;
        let collector = guard.finish();

        result?;
        self.shared.ensure_usable()?;

        let members = collector.map(|c| c.into_members()).unwrap_or_default();
        info!(guild_id = %guild_id, count = members.len(), "Member fetch finished");
        Ok(members)
    }

    async fn request_pages(
        &self,
        outbound: &OutboundSender,
        guild_id: GuildId,
        channel_id: ChannelId,
        max_count: u64,
    ) -> GatewayResult<()> {
        let groups = plan_ranges(max_count);
        info!(
            guild_id = %guild_id,
            channel_id = %channel_id,
            requests = groups.len(),
            "Requesting member list"
        );

        for group in &groups {
            let frame = GatewayPayload::member_list_request(
                guild_id,
                &[channel_id],
                group,
                LazyRequestOptions::default(),
            )
            .encode()?;

            outbound.send_confirmed(frame).await?;
            debug!(low = group[0].low, high = group[group.len() - 1].high, "Sent member request");
            self.pause(self.config.request_delay).await?;
        }

        let settle = settle_delay(self.config.settle_delay_min, self.config.settle_delay_max);
        debug!(settle_ms = settle.as_millis(), "Waiting for member list to settle");
        self.pause(settle).await
    }

    /// Sleeps for `duration`, returning early with the failure if the session
    /// becomes unusable meanwhile.
    async fn pause(&self, duration: Duration) -> GatewayResult<()> {
        let mut state_rx = self.shared.subscribe();

        tokio::select! {
            () = sleep(duration) => Ok(()),
            _ = state_rx.wait_for(ConnectionState::is_terminal) => self.shared.ensure_usable(),
        }
    }

    /// Stops the heartbeat and the connection task, then closes the
    /// transport. Safe to call before `connect`.
    pub async fn close(&mut self) {
        self.shared.transition(ConnectionState::Closed);
        self.stop_task().await;
        self.outbound = None;

        if let Some(mut connection) = self.connection.take()
            && connection.is_connected()
        {
            let _ = connection.disconnect().await;
        }
        info!("Gateway session closed");
    }

    async fn stop_task(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
        if let Some(task) = self.task.take() {
            self.shutdown.notify_one();
            let _ = task.await;
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Last dispatch sequence number seen.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.shared.sequence()
    }

    /// Whether READY arrived.
    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.shared.is_identified()
    }

    /// Interval announced by Hello.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.shared.heartbeat_interval()
    }

    /// Round trip of the last acknowledged heartbeat.
    #[must_use]
    pub fn latency_ms(&self) -> Option<u64> {
        self.shared.with_state(|s| s.latency_ms())
    }

    /// Reason the session failed, if it did.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.shared.failure()
    }

    /// Client properties sent with identify.
    #[must_use]
    pub const fn properties(&self) -> &ClientProperties {
        self.identify.properties()
    }
}

/// Releases the fetch accumulator even if the fetch future is dropped.
struct CollectorGuard<'a> {
    shared: &'a SessionShared,
}

impl CollectorGuard<'_> {
    fn finish(self) -> Option<MemberCollector> {
        self.shared.take_collector()
    }
}

impl Drop for CollectorGuard<'_> {
    fn drop(&mut self) {
        self.shared.take_collector();
    }
}

fn settle_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

fn spawn_driver(driver: ConnectionDriver, shared: Arc<SessionShared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = std::panic::AssertUnwindSafe(driver.run()).catch_unwind().await;

        if let Err(panic_info) = result {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            error!(panic = %panic_msg, "Gateway task panicked");
            shared.fail(format!("gateway task panicked: {panic_msg}"));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::UserId;
    use crate::domain::ports::mocks::MockUserAgentParser;
    use crate::infrastructure::discord::gateway::testing::ScriptedConnection;
    use serde_json::{Value, json};

    fn config() -> GatewaySessionConfig {
        GatewaySessionConfig::new().with_user_agent(Some("test-agent".into()))
    }

    fn parser() -> MockUserAgentParser {
        let mut parser = MockUserAgentParser::new();
        parser
            .expect_parse()
            .returning(|_| ClientProperties::new("Windows", "Firefox", "Other"));
        parser
    }

    fn session(connection: ScriptedConnection) -> GatewaySession {
        GatewaySession::with_parts(
            AuthToken::new_unchecked("token-value"),
            config(),
            Box::new(connection),
            &parser(),
        )
    }

    fn hello() -> String {
        json!({"op": 10, "d": {"heartbeat_interval": 10000}}).to_string()
    }

    fn ready() -> String {
        json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "s", "user": {"id": "5"}}})
            .to_string()
    }

    fn member_update(guild: &str, seq: u64, ids: &[&str]) -> String {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({"member": {"user": {"id": id, "username": "u"}, "roles": []}}))
            .collect();
        json!({
            "op": 0, "s": seq, "t": "GUILD_MEMBER_LIST_UPDATE",
            "d": {"guild_id": guild, "ops": [{"op": "SYNC", "range": [0, 99], "items": items}]}
        })
        .to_string()
    }

    #[test]
    fn test_identify_properties_from_user_agent() {
        let mut parser = MockUserAgentParser::new();
        parser
            .expect_parse()
            .withf(|ua: &str| ua == "test-agent")
            .times(1)
            .returning(|_| ClientProperties::new("Linux", "Chrome", "Other"));

        let (connection, _script) = ScriptedConnection::new();
        let session = GatewaySession::with_parts(
            AuthToken::new_unchecked("t"),
            config(),
            Box::new(connection),
            &parser,
        );

        assert_eq!(session.properties().browser, "Chrome");
    }

    #[test]
    fn test_platform_default_properties_without_user_agent() {
        let mut parser = MockUserAgentParser::new();
        parser.expect_parse().never();

        let (connection, _script) = ScriptedConnection::new();
        let session = GatewaySession::with_parts(
            AuthToken::new_unchecked("t"),
            GatewaySessionConfig::new(),
            Box::new(connection),
            &parser,
        );

        assert_eq!(session.properties(), &ClientProperties::platform_default());
    }

    #[test]
    fn test_settle_delay_bounds() {
        let min = Duration::from_secs(2);
        let max = Duration::from_secs(3);
        for _ in 0..100 {
            let delay = settle_delay(min, max);
            assert!(delay >= min && delay <= max);
        }
        assert_eq!(settle_delay(max, max), max);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_fetch_close() {
        let (connection, mut script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        assert!(session.is_identified());
        assert_eq!(session.state(), ConnectionState::Ready);
        assert_eq!(session.heartbeat_interval(), Some(Duration::from_secs(10)));
        assert!(script.sent_ops().contains(&2));
        assert!(script.proxy().is_none());

        let gateway = async {
            let request = script.next_with_op(14).await;
            assert_eq!(request["d"]["guild_id"], "1");
            assert_eq!(request["d"]["channels"]["2"][0], json!([0, 99]));
            script.push(member_update("1", 2, &["10", "11"]));
            script.push(member_update("1", 3, &["12"]));
        };
        let (members, ()) = tokio::join!(
            session.fetch_members(GuildId(1), ChannelId(2), 100),
            gateway
        );

        let ids: Vec<_> = members.unwrap().iter().map(|m| m.id().unwrap()).collect();
        assert_eq!(ids, vec![UserId(10), UserId(11), UserId(12)]);
        assert_eq!(session.sequence(), Some(3));
        assert!(script.sent_ops().contains(&1));

        session.close().await;
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(matches!(
            session.fetch_members(GuildId(1), ChannelId(2), 100).await,
            Err(GatewayError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_150_members_in_one_request() {
        let (connection, mut script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let gateway = async {
            let request = script.next_with_op(14).await;
            assert_eq!(
                request["d"]["channels"]["2"],
                json!([[0, 99], [100, 199], [200, 299]])
            );
            script.push(member_update("1", 2, &["10"]));
            script.push(member_update("1", 3, &["11"]));
        };
        let (members, ()) = tokio::join!(
            session.fetch_members(GuildId(1), ChannelId(2), 150),
            gateway
        );

        let ids: Vec<_> = members.unwrap().iter().map(|m| m.id().unwrap()).collect();
        assert_eq!(ids, vec![UserId(10), UserId(11)]);
        assert_eq!(script.sent_ops().iter().filter(|op| **op == 14).count(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_write_fails_fetch_and_session() {
        let (connection, mut script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();
        script.next_with_op(1).await;
        script.reject_sends();

        let err = session
            .fetch_members(GuildId(1), ChannelId(2), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SendFailed { .. }));

        let mut state = session.shared.subscribe();
        state.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(session.state(), ConnectionState::Failed);
        assert!(session.failure().unwrap().contains("broken pipe"));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_reaches_transport() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());
        let proxy = ProxyConfig::new("127.0.0.1", 3128).with_credentials("user", "pass");

        let mut session = GatewaySession::with_parts(
            AuthToken::new_unchecked("t"),
            config().with_proxy(Some(proxy.clone())),
            Box::new(connection),
            &parser(),
        );
        session.connect().await.unwrap();

        assert_eq!(script.proxy(), Some(proxy));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_sends_one_request_per_group() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let members = session
            .fetch_members(GuildId(1), ChannelId(2), 600)
            .await
            .unwrap();

        assert!(members.is_empty());
        assert_eq!(script.sent_ops().iter().filter(|op| **op == 14).count(), 3);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_for_other_guild_ignored() {
        let (connection, mut script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let gateway = async {
            script.next_with_op(14).await;
            script.push(member_update("99", 2, &["10"]));
        };
        let (members, ()) = tokio::join!(
            session.fetch_members(GuildId(1), ChannelId(2), 10),
            gateway
        );

        assert!(members.unwrap().is_empty());
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetch_rejected() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let (first, second) = tokio::join!(
            session.fetch_members(GuildId(1), ChannelId(2), 10),
            async {
                tokio::task::yield_now().await;
                session.fetch_members(GuildId(1), ChannelId(2), 10).await
            }
        );

        assert!(first.is_ok());
        assert!(matches!(second, Err(GatewayError::FetchInProgress)));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_opcode_fails_session() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let mut state = session.shared.subscribe();
        script.push(json!({"op": 99, "d": null}).to_string());
        state.wait_for(|s| s.is_terminal()).await.unwrap();

        assert_eq!(session.state(), ConnectionState::Failed);
        assert!(session.failure().unwrap().contains("unhandled opcode 99"));

        let err = session
            .fetch_members(GuildId(1), ChannelId(2), 10)
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_during_fetch_is_reported() {
        let (connection, mut script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let gateway = async {
            script.next_with_op(14).await;
            script.push(json!({"op": 9, "d": false}).to_string());
        };
        let (result, ()) = tokio::join!(
            session.fetch_members(GuildId(1), ChannelId(2), 10),
            gateway
        );

        assert!(matches!(result, Err(GatewayError::SessionFailed { .. })));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_closed_before_ready() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.close();

        let mut session = session(connection);
        let err = session.connect().await.unwrap_err();

        assert!(err.is_connection_error());
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_timeout() {
        let (connection, script) = ScriptedConnection::new();
        script.push(json!({"op": 10, "d": {"heartbeat_interval": 100_000}}).to_string());

        let mut session = GatewaySession::with_parts(
            AuthToken::new_unchecked("t"),
            config().with_ready_timeout(Duration::from_secs(5)),
            Box::new(connection),
            &parser(),
        );

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_gateway_times_out() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        let mut state = session.shared.subscribe();
        state.wait_for(|s| s.is_terminal()).await.unwrap();

        assert!(session.failure().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_calls_before_connect() {
        let (connection, _script) = ScriptedConnection::new();
        let mut session = session(connection);

        assert!(matches!(
            session.fetch_members(GuildId(1), ChannelId(2), 10).await,
            Err(GatewayError::NotIdentified)
        ));
        assert!(matches!(
            session.identify().await,
            Err(GatewayError::NotConnected)
        ));

        session.close().await;
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_rejected() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();

        assert!(matches!(
            session.connect().await,
            Err(GatewayError::AlreadyConnected)
        ));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_identify_after_auto_is_noop() {
        let (connection, script) = ScriptedConnection::new();
        script.push(hello());
        script.push(ready());

        let mut session = session(connection);
        session.connect().await.unwrap();
        session.identify().await.unwrap();

        assert_eq!(script.sent_ops().iter().filter(|op| **op == 2).count(), 1);
        session.close().await;
    }
}
