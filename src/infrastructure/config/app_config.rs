//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::args::CliArgs;
use crate::domain::entities::{AuthToken, ChannelId, GuildId};
use crate::infrastructure::discord::gateway::{
    DEFAULT_USER_AGENT, GATEWAY_URL, GatewaySessionConfig, IdentifyTrigger, MEMBER_REQUEST_DELAY,
    MEMBER_SETTLE_DELAY_MAX, MEMBER_SETTLE_DELAY_MIN, ProxyConfig,
};

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// How fetched members are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line per member.
    #[default]
    Text,
    /// A JSON array of members.
    Json,
}

/// CLI spelling of [`IdentifyTrigger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifyOn {
    /// Identify as soon as Hello arrives.
    #[default]
    Hello,
    /// Identify on the first heartbeat ACK.
    HeartbeatAck,
}

impl From<IdentifyOn> for IdentifyTrigger {
    fn from(value: IdentifyOn) -> Self {
        match value {
            IdentifyOn::Hello => Self::Hello,
            IdentifyOn::HeartbeatAck => Self::FirstHeartbeatAck,
        }
    }
}

/// Rejected driver configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The token is blank or has embedded whitespace.
    #[error("token is empty or contains whitespace")]
    InvalidToken,

    /// `--settle-min-ms` exceeds `--settle-max-ms`.
    #[error("settle delay bounds are inverted: min {min_ms}ms > max {max_ms}ms")]
    InvertedSettleDelay {
        /// Requested lower bound.
        min_ms: u64,
        /// Requested upper bound.
        max_ms: u64,
    },

    /// The proxy URL cannot be used.
    #[error("{0}")]
    InvalidProxy(String),
}

/// Resolved driver configuration.
#[derive(Debug)]
pub struct AppConfig {
    /// Account token.
    pub token: AuthToken,
    /// Guild whose members are fetched.
    pub guild_id: GuildId,
    /// Channel whose member list is subscribed to.
    pub channel_id: ChannelId,
    /// Upper bound of member indices requested.
    pub max_members: u64,
    /// `User-Agent` header and identify properties source.
    pub user_agent: String,
    /// Gateway WebSocket URL.
    pub gateway_url: String,
    /// HTTP proxy to tunnel through.
    pub proxy: Option<ProxyConfig>,
    /// When identify is sent.
    pub identify_on: IdentifyOn,
    /// Pause after each member-list request.
    pub request_delay: Duration,
    /// Lower bound of the final settle wait.
    pub settle_delay_min: Duration,
    /// Upper bound of the final settle wait.
    pub settle_delay_max: Duration,
    /// How members are printed.
    pub format: OutputFormat,
    /// Log file path. Logs go to stderr when unset.
    pub log_path: Option<PathBuf>,
    /// Log verbosity.
    pub log_level: LogLevel,
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl AppConfig {
    /// Validates CLI arguments and fills in defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the token or proxy URL is unusable or the
    /// settle delay bounds are inverted.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let token = AuthToken::new(args.token).ok_or(ConfigError::InvalidToken)?;
        let proxy = args
            .proxy
            .as_deref()
            .map(ProxyConfig::parse)
            .transpose()
            .map_err(|e| ConfigError::InvalidProxy(e.to_string()))?;

        let settle_min_ms = args
            .settle_min_ms
            .unwrap_or_else(|| millis(MEMBER_SETTLE_DELAY_MIN));
        let settle_max_ms = args
            .settle_max_ms
            .unwrap_or_else(|| millis(MEMBER_SETTLE_DELAY_MAX).max(settle_min_ms));
        if settle_min_ms > settle_max_ms {
            return Err(ConfigError::InvertedSettleDelay {
                min_ms: settle_min_ms,
                max_ms: settle_max_ms,
            });
        }

        Ok(Self {
            token,
            guild_id: GuildId(args.guild_id),
            channel_id: ChannelId(args.channel_id),
            max_members: args.max_members,
            user_agent: args
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            gateway_url: args.gateway_url.unwrap_or_else(|| GATEWAY_URL.to_string()),
            proxy,
            identify_on: args.identify_on.unwrap_or_default(),
            request_delay: args
                .request_delay_ms
                .map_or(MEMBER_REQUEST_DELAY, Duration::from_millis),
            settle_delay_min: Duration::from_millis(settle_min_ms),
            settle_delay_max: Duration::from_millis(settle_max_ms),
            format: args.format.unwrap_or_default(),
            log_path: args.log_path,
            log_level: args.log_level.unwrap_or_default(),
        })
    }

    /// Gateway settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> GatewaySessionConfig {
        GatewaySessionConfig::new()
            .with_gateway_url(self.gateway_url.clone())
            .with_user_agent(Some(self.user_agent.clone()))
            .with_proxy(self.proxy.clone())
            .with_identify_trigger(self.identify_on.into())
            .with_request_delay(self.request_delay)
            .with_settle_delay(self.settle_delay_min, self.settle_delay_max)
    }
}
