use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error};

use super::error::{GatewayError, GatewayResult};
use super::state::{ConnectionState, GatewayState};
use crate::domain::entities::{GuildId, Member, UserId};

#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    session_id: Option<String>,
    user_id: Option<UserId>,
    sequence: Option<u64>,
    identified: bool,
    identify_sent: bool,
}

impl SessionInfo {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session_id: None,
            user_id: None,
            sequence: None,
            identified: false,
            identify_sent: false,
        }
    }

    pub const fn update_sequence(&mut self, sequence: Option<u64>) {
        if let Some(seq) = sequence {
            self.sequence = Some(seq);
        }
    }

    /// Records the READY handshake. Returns `false` if the session was
    /// already identified.
    pub fn mark_identified(&mut self, session_id: Option<String>, user_id: Option<UserId>) -> bool {
        if self.identified {
            return false;
        }
        self.identified = true;
        self.session_id = session_id;
        self.user_id = user_id;
        true
    }

    /// Claims the single identify this session may send. Returns `false` if
    /// it was already claimed.
    pub const fn claim_identify(&mut self) -> bool {
        if self.identify_sent {
            return false;
        }
        self.identify_sent = true;
        true
    }

    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    #[must_use]
    pub const fn is_identified(&self) -> bool {
        self.identified
    }

    #[must_use]
    pub const fn identify_sent(&self) -> bool {
        self.identify_sent
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}

/// Accumulator registered by one in-flight member fetch.
#[derive(Debug)]
pub struct MemberCollector {
    guild_id: GuildId,
    members: Vec<Member>,
}

impl MemberCollector {
    #[must_use]
    pub const fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub const fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    #[must_use]
    pub fn into_members(self) -> Vec<Member> {
        self.members
    }
}

struct SessionInner {
    state: GatewayState,
    info: SessionInfo,
    failure: Option<String>,
    collector: Option<MemberCollector>,
}

/// State shared by the connection task, the heartbeat task and callers.
///
/// Every mutation goes through one lock, so a sequence number recorded by the
/// receive loop is visible to the next heartbeat.
pub struct SessionShared {
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl SessionShared {
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Mutex::new(SessionInner {
                state: GatewayState::new(),
                info: SessionInfo::new(),
                failure: None,
                collector: None,
            }),
            state_tx,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock().state.connection()
    }

    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.state.transition(next);
        if changed {
            debug!(state = %next, "Session state changed");
            self.state_tx.send_replace(next);
        }
        changed
    }

    /// Records the first failure and moves the session to `Failed`.
    /// Later failures are ignored.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.connection().is_terminal() {
            return false;
        }

        let reason = reason.into();
        error!(reason = %reason, "Gateway session failed");
        inner.failure = Some(reason);
        inner.state.transition(ConnectionState::Failed);
        self.state_tx.send_replace(ConnectionState::Failed);
        true
    }

    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.inner.lock().failure.clone()
    }

    /// # Errors
    ///
    /// Returns `SessionFailed` or `SessionClosed` once the session reached a
    /// terminal state.
    pub fn ensure_usable(&self) -> GatewayResult<()> {
        let inner = self.inner.lock();
        match inner.state.connection() {
            ConnectionState::Failed => Err(GatewayError::session_failed(
                inner.failure.clone().unwrap_or_else(|| "unknown failure".to_string()),
            )),
            ConnectionState::Closed => Err(GatewayError::SessionClosed),
            _ => Ok(()),
        }
    }

    pub fn update_sequence(&self, sequence: Option<u64>) {
        self.inner.lock().info.update_sequence(sequence);
    }

    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.inner.lock().info.sequence()
    }

    /// Sequence to carry in a heartbeat about to be sent; also stamps the
    /// send time used for latency.
    pub fn heartbeat_sequence(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        inner.state.record_heartbeat_sent();
        inner.info.sequence()
    }

    pub fn with_info<R>(&self, f: impl FnOnce(&mut SessionInfo) -> R) -> R {
        f(&mut self.inner.lock().info)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut GatewayState) -> R) -> R {
        f(&mut self.inner.lock().state)
    }

    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.inner.lock().info.is_identified()
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.inner.lock().state.heartbeat_interval()
    }

    /// # Errors
    ///
    /// Returns `GatewayError::FetchInProgress` if another fetch holds the
    /// accumulator.
    pub fn register_collector(&self, guild_id: GuildId) -> GatewayResult<()> {
        let mut inner = self.inner.lock();
        if inner.collector.is_some() {
            return Err(GatewayError::FetchInProgress);
        }
        inner.collector = Some(MemberCollector::new(guild_id));
        Ok(())
    }

    pub fn take_collector(&self) -> Option<MemberCollector> {
        self.inner.lock().collector.take()
    }

    #[must_use]
    pub fn collecting_for(&self) -> Option<GuildId> {
        self.inner.lock().collector.as_ref().map(MemberCollector::guild_id)
    }

    /// Appends members to the registered accumulator if it belongs to
    /// `guild_id`. Returns the accumulator size, or `None` if nothing was
    /// registered for that guild.
    pub fn push_members(&self, guild_id: GuildId, members: Vec<Member>) -> Option<usize> {
        let mut inner = self.inner.lock();
        let collector = inner
            .collector
            .as_mut()
            .filter(|c| c.guild_id == guild_id)?;
        collector.members.extend(members);
        Some(collector.members.len())
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}
