use std::time::{Duration, Instant};

/// Lifecycle of a gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started.
    #[default]
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, waiting for Hello.
    AwaitingHello,
    /// Hello received, waiting for READY.
    Identifying,
    /// READY received; member fetches are allowed.
    Ready,
    /// Closed by the caller.
    Closed,
    /// Ended by an error.
    Failed,
}

impl ConnectionState {
    /// Whether READY arrived and the session is still usable.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// States a session never leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingHello => write!(f, "Awaiting Hello"),
            Self::Identifying => write!(f, "Identifying"),
            Self::Ready => write!(f, "Ready"),
            Self::Closed => write!(f, "Closed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

pub struct GatewayState {
    connection: ConnectionState,
    heartbeat_interval: Option<Duration>,
    last_heartbeat_sent: Option<Instant>,
    latency_ms: Option<u64>,
}

impl GatewayState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            heartbeat_interval: None,
            last_heartbeat_sent: None,
            latency_ms: None,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Moves to `next` unless the session already reached a terminal state.
    /// Returns whether the state changed.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if self.connection.is_terminal() || self.connection == next {
            return false;
        }

        self.connection = next;
        true
    }

    pub const fn set_heartbeat_interval(&mut self, interval: Duration) {
        self.heartbeat_interval = Some(interval);
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub fn record_heartbeat_sent(&mut self) {
        self.last_heartbeat_sent = Some(Instant::now());
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn record_heartbeat_ack(&mut self) {
        if let Some(sent) = self.last_heartbeat_sent {
            self.latency_ms = Some(sent.elapsed().as_millis() as u64);
        }
    }

    #[must_use]
    pub const fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}
