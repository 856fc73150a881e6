use thiserror::Error;

use crate::domain::errors::MemberError;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("connection closed with code {code}: {reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("websocket error: {message}")]
    WebSocket { message: String },

    #[error("timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("session invalidated by gateway, resumable: {resumable}")]
    SessionInvalidated { resumable: bool },

    #[error("session failed: {reason}")]
    SessionFailed { reason: String },

    #[error("session closed")]
    SessionClosed,

    #[error("not connected to gateway")]
    NotConnected,

    #[error("already connecting or connected")]
    AlreadyConnected,

    #[error("protocol error: unhandled opcode {opcode}")]
    UnexpectedOpcode { opcode: u8 },

    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    #[error("serialization error: {message}")]
    SerializationError { message: String },

    #[error("session not identified yet")]
    NotIdentified,

    #[error("send failed: {message}")]
    SendFailed { message: String },

    #[error("a member fetch is already in progress on this session")]
    FetchInProgress,

    #[error("invalid proxy: {message}")]
    InvalidProxy { message: String },

    #[error(transparent)]
    Member(#[from] MemberError),
}

impl GatewayError {
    #[must_use]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_proxy(message: impl Into<String>) -> Self {
        Self::InvalidProxy {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn session_failed(reason: impl Into<String>) -> Self {
        Self::SessionFailed {
            reason: reason.into(),
        }
    }

    /// Transport, handshake or lifecycle failure: the session cannot be used
    /// for further requests.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionClosed { .. }
                | Self::WebSocket { .. }
                | Self::Timeout { .. }
                | Self::SessionInvalidated { .. }
                | Self::SessionFailed { .. }
                | Self::SessionClosed
                | Self::NotConnected
                | Self::AlreadyConnected
        )
    }

    /// The gateway sent something this client cannot interpret.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedOpcode { .. }
                | Self::ProtocolError { .. }
                | Self::SerializationError { .. }
        )
    }
}
