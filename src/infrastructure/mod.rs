//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Discord gateway client.
pub mod discord;

pub use config::{AppConfig, CliArgs, ConfigError, LogLevel, OutputFormat};
pub use discord::{
    GatewayConnection, GatewayError, GatewayResult, GatewaySession, GatewaySessionConfig,
    IdentifyTrigger, ProxyConfig, RegexUserAgentParser,
};
