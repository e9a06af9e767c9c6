//! Re-targeting a handshake onto the widget's follow-up connection.
//!
//! Over plain HTTP the widget needs two requests: the first `auth` returns
//! the token, the second (carrying the first one's `connectionId`) stays
//! open until the verification outcome is known. The second request arrives
//! on a fresh connection with its own throwaway session; handoff moves its
//! parked reply onto the original session and drops the throwaway.

use enface_core::{BrokerError, ConnectionId};

use crate::registry::{Session, Sessions};
use crate::resolver::Exchange;

/// Runs entirely under the registry lock; sessions to shut down are pushed
/// onto `doomed` for the caller to finalize after unlocking.
pub(crate) fn hand_off(
    sessions: &mut Sessions<'_>,
    exchange: &mut Exchange,
    target: &ConnectionId,
    doomed: &mut Vec<Session>,
) -> Result<(), BrokerError> {
    if !sessions.contains(target) {
        return Err(BrokerError::ConnectionNotFound(target.clone()));
    }
    if exchange.id() == target {
        return Err(BrokerError::InvalidRequest(
            "connection cannot continue its own handshake".into(),
        ));
    }

    // The throwaway may already be gone (reaped); then there is nothing
    // parked to move and the exchange has been closed.
    let (pending, connection) = match sessions.detach(exchange.id()) {
        Some(mut throwaway) => {
            let moved = (throwaway.pending.take(), throwaway.connection.take());
            doomed.push(throwaway);
            moved
        }
        None => (None, None),
    };

    let Some(session) = sessions.get_mut(target) else {
        return Err(BrokerError::ConnectionNotFound(target.clone()));
    };
    // A session owns at most one live connection: an earlier follow-up that
    // is still parked here is superseded and gets closed.
    session.pending = pending;
    if let Some(previous) = std::mem::replace(&mut session.connection, connection) {
        if let Err(e) = previous.close() {
            tracing::warn!(connection_id = %target, error = %e, "failed to close superseded connection");
        }
    }

    tracing::debug!(from = %exchange.id(), to = %target, "handshake handed off");
    exchange.rebind(target.clone());
    Ok(())
}
