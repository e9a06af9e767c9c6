use crate::ids::{ConnectionId, SessionId};

/// Everything that can go wrong while brokering a handshake.
///
/// The `Display` text is what the offending caller receives in the
/// `message` field of an error reply.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("Wrong data received {0}")]
    MalformedInput(String),
    #[error("Unknown command {0}")]
    UnknownCommand(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Client not found")]
    SessionNotFound(SessionId),
    #[error("Failed to get session params for client {0}")]
    ConnectionNotFound(ConnectionId),
    #[error("Client already activated")]
    AlreadyActivated(SessionId),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl BrokerError {
    /// Short classification string for log fields.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::UnknownCommand(_) => "unknown_command",
            Self::InvalidRequest(_) => "invalid_request",
            Self::SessionNotFound(_) | Self::ConnectionNotFound(_) => "session_not_found",
            Self::AlreadyActivated(_) => "already_activated",
            Self::Transport(_) => "transport",
        }
    }
}
