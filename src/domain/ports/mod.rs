mod user_agent_port;

pub use user_agent_port::{ClientProperties, UserAgentParser};
