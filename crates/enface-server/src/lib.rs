//! HTTP transport for the Enface broker.
//!
//! Each POST to the configured path is one exchange: the body is a command
//! envelope, and the response is whatever the broker eventually resolves
//! for that exchange (possibly after a long wait for the verification
//! server), or the plain-text body `timeout` if the exchange was closed.

pub mod health;
pub mod server;

pub use server::{broker_config, router, start, AppState, ServerHandle, CLOSED_BODY};
