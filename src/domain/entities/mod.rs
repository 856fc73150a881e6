//! Domain entity definitions.

mod channel;
mod guild;
mod member;
mod role;
mod token;
mod user;

pub use channel::ChannelId;
pub use guild::GuildId;
pub use member::{ClientDevice, Member, Presence, PresenceStatus};
pub use role::RoleId;
pub use token::AuthToken;
pub use user::{User, UserFlags, UserId};
