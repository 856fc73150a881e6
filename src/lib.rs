//! lazycord - fetch Discord guild member lists over the gateway.
//!
//! The gateway only pushes member lists to clients that subscribe to a
//! channel's lazy member list. This crate opens a gateway session, performs
//! the identify handshake, keeps the heartbeat going and collects the
//! `GUILD_MEMBER_LIST_UPDATE` pushes answering paginated opcode 14 requests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the gateway client and configuration.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "lazycord";
