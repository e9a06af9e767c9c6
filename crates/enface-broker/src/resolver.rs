//! Parking a reply on one connection and completing it from another.
//!
//! Every inbound exchange is split in two. The transport keeps the
//! [`Exchange`] and awaits its [`Outcome`]; the registry keeps the
//! [`PendingReply`] and the [`Connection`] on the session record. Any later
//! command, running in any task, can complete the exchange by resolving the
//! pending reply, or abort it by closing the connection.

use enface_core::protocol::Reply;
use enface_core::{BrokerError, ConnectionId};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Transport-side handle on an open network connection.
pub trait Connection: Send + Sync {
    /// Terminate the connection without a reply. Must be idempotent.
    fn close(&self) -> Result<(), BrokerError>;
}

/// The function that completes one open exchange. Consumed on use, so an
/// exchange can never be answered twice.
#[derive(Debug)]
pub struct PendingReply {
    tx: oneshot::Sender<Reply>,
}

impl PendingReply {
    /// Deliver `reply`. Fails only if the transport already gave up on the
    /// exchange (peer disconnected).
    pub fn resolve(self, reply: Reply) -> Result<(), BrokerError> {
        self.tx
            .send(reply)
            .map_err(|_| BrokerError::Transport("connection gone before reply".into()))
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// How an exchange ended, as seen by the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Reply(Reply),
    /// Closed without a reply: TTL expiry, or superseded by another connection.
    Closed,
}

/// Transport-side half of one inbound exchange.
#[derive(Debug)]
pub struct Exchange {
    id: ConnectionId,
    rx: oneshot::Receiver<Reply>,
    closed: CancellationToken,
}

impl Exchange {
    /// Identity this exchange currently answers to. Changes on handoff.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub(crate) fn rebind(&mut self, id: ConnectionId) {
        self.id = id;
    }

    /// Wait until the exchange is resolved or closed.
    pub async fn outcome(self) -> Outcome {
        let Self { rx, closed, .. } = self;
        tokio::select! {
            // A reply that is already queued wins over a close that follows it.
            biased;
            reply = rx => reply.map(Outcome::Reply).unwrap_or(Outcome::Closed),
            () = closed.cancelled() => Outcome::Closed,
        }
    }
}

/// [`Connection`] backed by the exchange's cancellation token.
#[derive(Debug)]
pub struct ExchangeConnection {
    closed: CancellationToken,
}

impl Connection for ExchangeConnection {
    fn close(&self) -> Result<(), BrokerError> {
        self.closed.cancel();
        Ok(())
    }
}

/// Split a new exchange into its transport and registry halves.
pub fn exchange(id: ConnectionId) -> (Exchange, PendingReply, ExchangeConnection) {
    let (tx, rx) = oneshot::channel();
    let closed = CancellationToken::new();
    (
        Exchange {
            id,
            rx,
            closed: closed.clone(),
        },
        PendingReply { tx },
        ExchangeConnection { closed },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolved_exchange_yields_reply() {
        let (ex, pending, _conn) = exchange(ConnectionId::new());
        pending.resolve(Reply::Ready).unwrap();
        assert_eq!(ex.outcome().await, Outcome::Reply(Reply::Ready));
    }

    #[tokio::test]
    async fn closed_exchange_yields_closed() {
        let (ex, _pending, conn) = exchange(ConnectionId::new());
        conn.close().unwrap();
        assert_eq!(ex.outcome().await, Outcome::Closed);
    }

    #[tokio::test]
    async fn dropping_pending_closes_exchange() {
        let (ex, pending, _conn) = exchange(ConnectionId::new());
        drop(pending);
        assert_eq!(ex.outcome().await, Outcome::Closed);
    }

    #[tokio::test]
    async fn reply_then_close_still_delivers_reply() {
        let (ex, pending, conn) = exchange(ConnectionId::new());
        pending.resolve(Reply::Ready).unwrap();
        conn.close().unwrap();
        assert_eq!(ex.outcome().await, Outcome::Reply(Reply::Ready));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (_ex, _pending, conn) = exchange(ConnectionId::new());
        assert!(conn.close().is_ok());
        assert!(conn.close().is_ok());
    }

    #[test]
    fn resolve_after_transport_gone_fails() {
        let (ex, pending, _conn) = exchange(ConnectionId::new());
        drop(ex);
        assert!(!pending.is_open());
        let err = pending.resolve(Reply::Ready).unwrap_err();
        assert_eq!(err.error_kind(), "transport");
    }

    #[tokio::test]
    async fn resolve_from_another_task() {
        let (ex, pending, _conn) = exchange(ConnectionId::new());
        let waiter = tokio::spawn(ex.outcome());
        tokio::spawn(async move { pending.resolve(Reply::BioAuthAck { result: true }) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            waiter.await.unwrap(),
            Outcome::Reply(Reply::BioAuthAck { result: true })
        );
    }
}
