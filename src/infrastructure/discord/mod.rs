//! Discord gateway client.

pub mod gateway;
mod user_agent;

pub use gateway::{
    GatewayConnection, GatewayError, GatewayResult, GatewaySession, GatewaySessionConfig,
    IdentifyTrigger, ProxyConfig,
};
pub use user_agent::RegexUserAgentParser;
