use super::app_config::{IdentifyOn, LogLevel, OutputFormat};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments of the `lazycord` driver.
#[derive(Debug, Parser)]
#[command(
    name = "lazycord",
    version,
    about = "Fetch a guild's member list over the Discord gateway",
    long_about = None
)]
pub struct CliArgs {
    /// Account token used to identify.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Guild whose members are fetched.
    #[arg(long, env = "LAZYCORD_GUILD_ID")]
    pub guild_id: u64,

    /// Channel whose member list is subscribed to.
    #[arg(long, env = "LAZYCORD_CHANNEL_ID")]
    pub channel_id: u64,

    /// Upper bound of member indices requested.
    #[arg(long, env = "LAZYCORD_MAX_MEMBERS", default_value_t = 10_000)]
    pub max_members: u64,

    /// User-Agent header and source of the identify properties.
    #[arg(long, env = "LAZYCORD_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Gateway URL override.
    #[arg(long, env = "LAZYCORD_GATEWAY_URL", value_name = "URL")]
    pub gateway_url: Option<String>,

    /// HTTP proxy as `http://[user[:password]@]host[:port]`.
    #[arg(long, env = "LAZYCORD_PROXY", hide_env_values = true, value_name = "URL")]
    pub proxy: Option<String>,

    /// When identify is sent.
    #[arg(long, env = "LAZYCORD_IDENTIFY_ON", value_enum)]
    pub identify_on: Option<IdentifyOn>,

    /// Pause after each member-list request, in milliseconds.
    #[arg(long, env = "LAZYCORD_REQUEST_DELAY_MS")]
    pub request_delay_ms: Option<u64>,

    /// Lower bound of the final settle wait, in milliseconds.
    #[arg(long, env = "LAZYCORD_SETTLE_MIN_MS")]
    pub settle_min_ms: Option<u64>,

    /// Upper bound of the final settle wait, in milliseconds.
    #[arg(long, env = "LAZYCORD_SETTLE_MAX_MS")]
    pub settle_max_ms: Option<u64>,

    /// Output format for the fetched members.
    #[arg(long, env = "LAZYCORD_FORMAT", value_enum)]
    pub format: Option<OutputFormat>,

    /// Log file path.
    #[arg(long, env = "LAZYCORD_LOG_PATH", value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, env = "LAZYCORD_LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
}
