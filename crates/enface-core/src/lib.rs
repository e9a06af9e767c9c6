//! Shared types for the Enface authentication broker: wire identifiers, the
//! command envelope, the handshake token cipher and the error taxonomy.

pub mod cipher;
pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::BrokerError;
pub use ids::{ConnectionId, SessionId};

/// How long a handshake may stay open (ten minutes) unless configured otherwise.
pub const AUTHORIZATION_TIME_FRAME: std::time::Duration = std::time::Duration::from_secs(10 * 60);
