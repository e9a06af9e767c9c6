//! Command envelope spoken by the widget and the verification server.
//!
//! Every message is a JSON object whose `_` field names the command; the
//! remaining fields depend on the command.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BrokerError;
use crate::ids::{ConnectionId, SessionId};

/// Commands the broker understands. Anything else is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    /// Widget: start a handshake, or continue one on a second connection.
    Auth,
    /// Verification server: one-time liveness probe for a session.
    Check,
    /// Verification server: deliver the verification outcome.
    Authenticate,
}

impl CommandTag {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "auth" => Some(Self::Auth),
            "check" => Some(Self::Check),
            // legacy name used by older verification servers
            "authenticate" | "bcauth" => Some(Self::Authenticate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Check => "check",
            Self::Authenticate => "authenticate",
        }
    }
}

impl std::fmt::Display for CommandTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Auth {
        /// Identity of the connection that started this handshake, when the
        /// widget is continuing it over a new connection.
        continuation: Option<ConnectionId>,
    },
    Check {
        session_id: SessionId,
    },
    Authenticate {
        session_id: SessionId,
        alias: Value,
        fields: Value,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthFields {
    #[serde(default, alias = "clientId")]
    connection_id: Option<String>,
}

#[derive(Deserialize)]
struct AuthenticateFields {
    #[serde(default)]
    alias: Value,
    #[serde(default)]
    fields: Value,
}

impl Command {
    /// Parse a raw request body.
    pub fn parse(body: &str) -> Result<Self, BrokerError> {
        let value: Value =
            serde_json::from_str(body).map_err(|_| BrokerError::MalformedInput(body.to_owned()))?;

        let tag = match value.get("_") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "<missing>".to_owned(),
        };
        let Some(command) = CommandTag::parse(&tag) else {
            return Err(BrokerError::UnknownCommand(tag));
        };

        let invalid = |e: serde_json::Error| BrokerError::InvalidRequest(e.to_string());
        match command {
            CommandTag::Auth => {
                let f: AuthFields = serde_json::from_value(value).map_err(invalid)?;
                Ok(Self::Auth {
                    continuation: f
                        .connection_id
                        .filter(|id| !id.is_empty())
                        .map(ConnectionId::from_raw),
                })
            }
            CommandTag::Check => Ok(Self::Check {
                session_id: session_id_field(&value),
            }),
            CommandTag::Authenticate => {
                let session_id = session_id_field(&value);
                let f: AuthenticateFields = serde_json::from_value(value).map_err(invalid)?;
                Ok(Self::Authenticate {
                    session_id,
                    alias: f.alias,
                    fields: f.fields,
                })
            }
        }
    }

    pub fn tag(&self) -> CommandTag {
        match self {
            Self::Auth { .. } => CommandTag::Auth,
            Self::Check { .. } => CommandTag::Check,
            Self::Authenticate { .. } => CommandTag::Authenticate,
        }
    }
}

/// `sessionId` as sent. A missing or non-string value is kept in its JSON
/// rendering: it can never name a live session, so the lookup reports
/// `Client not found` rather than a shape error.
fn session_id_field(value: &Value) -> SessionId {
    match value.get("sessionId") {
        Some(Value::String(s)) => SessionId::from_raw(s.as_str()),
        Some(other) => SessionId::from_raw(other.to_string()),
        None => SessionId::from_raw(""),
    }
}

/// What the verification server vouches for once biometrics succeed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub alias: Value,
    pub fields: Value,
}

/// Outbound message on a connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum Reply {
    /// Widget's first `auth`: the token to hand to the verification app.
    #[serde(rename = "auth")]
    Token {
        token: String,
        /// Project id.
        id: String,
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        fields: String,
    },
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "bioAuthAck")]
    BioAuthAck { result: bool },
    #[serde(rename = "userInfo")]
    UserInfo {
        #[serde(rename = "userInfo")]
        user_info: UserInfo,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<&BrokerError> for Reply {
    fn from(err: &BrokerError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}
