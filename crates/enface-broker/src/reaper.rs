//! One-shot TTL timer per session.

use std::sync::Weak;
use std::time::Duration;

use enface_core::{ConnectionId, SessionId};
use tokio::task::AbortHandle;

use crate::registry::SessionRegistry;

/// Spawn the expiry timer for one session instance. The timer is keyed to
/// `(connection_id, session_id)`: if the connection id has since been reused
/// by another session, firing is a no-op.
pub(crate) fn arm(
    registry: Weak<SessionRegistry>,
    connection_id: ConnectionId,
    session_id: SessionId,
    ttl: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        if registry.expire(&connection_id, &session_id) {
            tracing::info!(
                connection_id = %connection_id,
                session_id = %session_id,
                ttl_secs = ttl.as_secs(),
                "session expired"
            );
        }
    })
    .abort_handle()
}
