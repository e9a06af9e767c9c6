//! Protocol state machine: interprets command envelopes and drives each
//! session from creation to finalization.
//!
//! ```text
//! CREATED --auth--> [HANDED_OFF] --> AWAITING_CHECK --check--> ACTIVATED --authenticate--> FINALIZED
//! ```
//!
//! `FINALIZED` is also reached by TTL expiry or any protocol error on the
//! session's own connection, and always coincides with registry removal.

use std::sync::Arc;
use std::time::Duration;

use enface_core::cipher::{TokenCipher, TokenPayload};
use enface_core::protocol::{Command, CommandTag, Reply, UserInfo};
use enface_core::{BrokerError, ConnectionId, SessionId};
use serde_json::Value;

use crate::handoff;
use crate::registry::{Session, SessionRegistry, Sessions};
use crate::resolver::{self, Exchange, Outcome};

/// Per-project settings the broker echoes into tokens and replies.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub project_id: String,
    pub fields: String,
    /// Where the verification server calls back; no trailing slash.
    pub callback_url: String,
    pub ttl: Duration,
}

impl BrokerConfig {
    pub fn new(
        project_id: impl Into<String>,
        fields: impl Into<String>,
        callback_url: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let mut callback_url = callback_url.into();
        if callback_url.ends_with('/') {
            callback_url.pop();
        }
        Self {
            project_id: project_id.into(),
            fields: fields.into(),
            callback_url,
            ttl,
        }
    }
}

/// The handshake broker. Cheap to share behind an `Arc`.
pub struct Broker {
    registry: Arc<SessionRegistry>,
    cipher: TokenCipher,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(config: BrokerConfig, cipher: TokenCipher) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(config.ttl)),
            cipher,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Register a newly accepted connection.
    pub fn open(&self) -> Exchange {
        let id = ConnectionId::new();
        let (exchange, pending, connection) = resolver::exchange(id.clone());
        self.registry.create(id, Some(pending), Some(Box::new(connection)));
        exchange
    }

    /// Handle one request end to end: register, dispatch, wait for the reply.
    pub async fn request(&self, body: &str) -> Outcome {
        let mut exchange = self.open();
        self.dispatch(&mut exchange, body);
        exchange.outcome().await
    }

    /// Interpret `body` as a command arriving on `exchange`.
    ///
    /// Never fails: protocol errors become an error reply on the exchange,
    /// after which its session is finalized.
    pub fn dispatch(&self, exchange: &mut Exchange, body: &str) {
        tracing::debug!(connection_id = %exchange.id(), body, "request");

        let result = Command::parse(body).and_then(|command| {
            tracing::debug!(connection_id = %exchange.id(), command = %command.tag(), "dispatch");
            match command {
                Command::Auth {
                    continuation: Some(target),
                } => self.continue_handshake(exchange, &target),
                Command::Auth { continuation: None } => self.start_handshake(exchange.id()),
                Command::Check { session_id } => self.check(exchange.id(), &session_id),
                Command::Authenticate {
                    session_id,
                    alias,
                    fields,
                } => self.authenticate(exchange.id(), &session_id, alias, fields),
            }
        });

        if let Err(err) = result {
            self.fail(exchange.id(), &err);
        }
    }

    /// First `auth`: issue the token. The session stays registered so the
    /// widget can continue and the verification server can find it.
    fn start_handshake(&self, connection_id: &ConnectionId) -> Result<(), BrokerError> {
        let mut sessions = self.registry.lock();
        let session_id = sessions
            .get(connection_id)
            .map(|s| s.session_id.clone())
            .ok_or_else(|| BrokerError::ConnectionNotFound(connection_id.clone()))?;

        let token = self.cipher.seal(&TokenPayload {
            session_id,
            callback_url: self.config.callback_url.clone(),
            command: CommandTag::Auth.as_str().to_owned(),
        });
        let reply = Reply::Token {
            token,
            id: self.config.project_id.clone(),
            connection_id: connection_id.clone(),
            fields: self.config.fields.clone(),
        };
        deliver(&mut sessions, connection_id, reply, false);
        Ok(())
    }

    /// Follow-up `auth` on a second connection: nothing is sent now, the
    /// exchange stays parked on the original session.
    fn continue_handshake(&self, exchange: &mut Exchange, target: &ConnectionId) -> Result<(), BrokerError> {
        let mut doomed = Vec::new();
        let result = {
            let mut sessions = self.registry.lock();
            handoff::hand_off(&mut sessions, exchange, target, &mut doomed)
        };
        SessionRegistry::finalize(doomed);
        result
    }

    fn check(&self, connection_id: &ConnectionId, session_id: &SessionId) -> Result<(), BrokerError> {
        let mut doomed = Vec::new();
        {
            let mut sessions = self.registry.lock();
            let session = sessions
                .find_by_session_id_mut(session_id)
                .ok_or_else(|| BrokerError::SessionNotFound(session_id.clone()))?;
            if session.activated {
                return Err(BrokerError::AlreadyActivated(session_id.clone()));
            }
            session.activated = true;
            tracing::debug!(session_id = %session_id, "session activated");

            doomed.extend(deliver(&mut sessions, connection_id, Reply::Ready, true));
        }
        SessionRegistry::finalize(doomed);
        Ok(())
    }

    fn authenticate(
        &self,
        connection_id: &ConnectionId,
        session_id: &SessionId,
        alias: Value,
        fields: Value,
    ) -> Result<(), BrokerError> {
        let mut doomed = Vec::new();
        {
            let mut sessions = self.registry.lock();
            let widget = sessions
                .find_by_session_id(session_id)
                .map(|s| s.connection_id.clone())
                .ok_or_else(|| BrokerError::SessionNotFound(session_id.clone()))?;

            doomed.extend(deliver(
                &mut sessions,
                connection_id,
                Reply::BioAuthAck { result: true },
                true,
            ));
            let user_info = Reply::UserInfo {
                user_info: UserInfo { alias, fields },
            };
            doomed.extend(deliver(&mut sessions, &widget, user_info, true));
        }
        tracing::info!(session_id = %session_id, "handshake completed");
        SessionRegistry::finalize(doomed);
        Ok(())
    }

    /// Error reply on the offending connection, then finalize its session.
    fn fail(&self, connection_id: &ConnectionId, err: &BrokerError) {
        tracing::warn!(
            connection_id = %connection_id,
            error_kind = err.error_kind(),
            error = %err,
            "request failed"
        );
        let doomed = {
            let mut sessions = self.registry.lock();
            deliver(&mut sessions, connection_id, Reply::from(err), true)
        };
        SessionRegistry::finalize(doomed.into_iter().collect());
    }
}

/// Resolve the exchange parked on `connection_id`, if it is still waiting.
/// With `finish`, the session is also taken out of the registry and
/// returned for shutdown once the lock is released.
fn deliver(
    sessions: &mut Sessions<'_>,
    connection_id: &ConnectionId,
    reply: Reply,
    finish: bool,
) -> Option<Session> {
    let session = sessions.get_mut(connection_id)?;
    match session.pending.take() {
        Some(pending) if pending.is_open() => {
            if let Err(e) = pending.resolve(reply) {
                tracing::warn!(connection_id = %connection_id, error = %e, "reply not delivered");
            }
        }
        Some(_) => {
            tracing::debug!(connection_id = %connection_id, "peer left before reply");
        }
        None => {
            tracing::debug!(connection_id = %connection_id, "no parked reply");
        }
    }
    if finish {
        sessions.detach(connection_id)
    } else {
        None
    }
}
