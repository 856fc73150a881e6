use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use lazycord::domain::{Member, User};
use lazycord::infrastructure::{AppConfig, CliArgs, GatewaySession, OutputFormat};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn describe(member: &Member) -> String {
    let status = member
        .status()
        .map_or_else(|_| "unknown".to_string(), |s| s.to_string());
    let device = member
        .device()
        .map_or_else(|_| "-".to_string(), |d| d.to_string());

    let name = member.display_name().unwrap_or("-");
    let bot = if member.user().is_ok_and(User::is_bot) {
        " [bot]"
    } else {
        ""
    };

    match member.id() {
        Ok(id) => format!("{id}\t{member}{bot}\t{name}\t{status}\t{device}"),
        Err(e) => format!("?\t{member}\t{name}\t{e}"),
    }
}

fn print_members(members: &[Member], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for member in members {
                println!("{}", describe(member));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(members)?);
        }
    }
    Ok(())
}

async fn fetch(session: &mut GatewaySession, config: &AppConfig) -> Result<Vec<Member>> {
    session
        .connect()
        .await
        .wrap_err("Failed to connect to the gateway")?;

    session
        .fetch_members(config.guild_id, config.channel_id, config.max_members)
        .await
        .wrap_err("Failed to fetch members")
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_args(CliArgs::parse())?;
    init_logging(&config)?;

    info!(version = lazycord::VERSION, token = %config.token, "Starting lazycord");

    let mut session = GatewaySession::new(config.token.clone(), config.session_config());
    let result = fetch(&mut session, &config).await;
    session.close().await;

    let members = result?;
    let online = members
        .iter()
        .filter(|m| m.status().is_ok_and(|s| s.is_online()))
        .count();
    info!(count = members.len(), online, "Fetched members");
    print_members(&members, config.format)
}
