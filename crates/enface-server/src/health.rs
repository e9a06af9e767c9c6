//! `/health` endpoint.

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Handshakes currently tracked by the registry.
    pub sessions: usize,
}

pub fn health_check(sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        sessions,
    }
}
