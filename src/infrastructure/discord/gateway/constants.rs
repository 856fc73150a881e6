use std::time::Duration;

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=9&encoding=json";

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Receive deadline used until Hello announces the real heartbeat interval.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(60);

pub const MEMBER_REQUEST_DELAY: Duration = Duration::from_millis(1500);
pub const MEMBER_SETTLE_DELAY_MIN: Duration = Duration::from_secs(2);
pub const MEMBER_SETTLE_DELAY_MAX: Duration = Duration::from_secs(3);

pub const OUTBOUND_QUEUE_SIZE: usize = 32;

pub const LARGE_THRESHOLD: u16 = 250;
pub const IDENTIFY_VERSION: u8 = 3;

/// Width of a single member-list range.
pub const RANGE_SIZE: u64 = 100;
/// Ranges the gateway accepts in one lazy request.
pub const RANGES_PER_REQUEST: usize = 3;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:92.0) Gecko/20100101 Firefox/92.0";

pub const EVENT_READY: &str = "READY";
pub const EVENT_GUILD_MEMBER_LIST_UPDATE: &str = "GUILD_MEMBER_LIST_UPDATE";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOpcode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    Reconnect = 7,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
    /// Opcode 14: subscribe to a guild channel's member list.
    LazyRequest = 14,
}

impl GatewayOpcode {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            14 => Some(Self::LazyRequest),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<GatewayOpcode> for u8 {
    fn from(opcode: GatewayOpcode) -> Self {
        opcode.as_u8()
    }
}
