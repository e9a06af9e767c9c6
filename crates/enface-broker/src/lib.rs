//! Session correlation engine for the Enface handshake.
//!
//! A handshake spans several unrelated network exchanges: the widget's
//! `auth` (possibly continued on a second connection) and the verification
//! server's `check` and `authenticate`. The [`Broker`] ties them together
//! through the [`SessionRegistry`], parks the widget's reply until the
//! verification outcome arrives, and reaps sessions that outlive their TTL.

pub mod dispatcher;
mod handoff;
mod reaper;
pub mod registry;
pub mod resolver;

pub use dispatcher::{Broker, BrokerConfig};
pub use registry::{SessionInfo, SessionRegistry};
pub use resolver::{Connection, Exchange, Outcome, PendingReply};
