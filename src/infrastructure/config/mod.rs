//! Application configuration.

pub mod app_config;
pub mod args;

pub use app_config::{AppConfig, ConfigError, IdentifyOn, LogLevel, OutputFormat};
pub use args::CliArgs;
