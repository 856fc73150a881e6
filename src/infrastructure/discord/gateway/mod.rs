mod client;
mod codec;
mod connection;
mod constants;
mod dispatcher;
mod error;
mod heartbeat;
mod payloads;
mod proxy;
mod ranges;
mod session;
mod state;
#[cfg(test)]
mod testing;

pub use client::{GatewaySession, GatewaySessionConfig};
pub use codec::EventParser;
pub use connection::{GatewayConnection, WebSocketConnection};
pub use constants::{
    DEFAULT_USER_AGENT, GATEWAY_URL, GatewayOpcode, MEMBER_REQUEST_DELAY, MEMBER_SETTLE_DELAY_MAX,
    MEMBER_SETTLE_DELAY_MIN,
};
pub use dispatcher::IdentifyTrigger;
pub use error::{GatewayError, GatewayResult};
pub use payloads::{GatewayPayload, LazyRequestOptions};
pub use proxy::ProxyConfig;
pub use ranges::{MemberRange, RangeGroup, plan_ranges};
pub use state::ConnectionState;
