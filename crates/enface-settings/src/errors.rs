//! Why a broker configuration could not be produced.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON, or a key holds the wrong type.
    #[error("malformed settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// `secretCode` does not decode to a 256-bit key.
    #[error("secretCode {0}")]
    Secret(String),
    /// `server.path` cannot be mounted.
    #[error("server.path {0}")]
    Route(String),
    /// A required value is missing or out of range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("/etc/enface.json"),
            source,
        };
        assert!(err.to_string().starts_with("malformed settings in /etc/enface.json"));
    }

    #[test]
    fn read_error_keeps_its_source() {
        let err = SettingsError::Read {
            path: PathBuf::from("enface.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("denied"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn secret_and_route_messages() {
        let err = SettingsError::Secret("must decode to 32 bytes, got 16".into());
        assert_eq!(err.to_string(), "secretCode must decode to 32 bytes, got 16");
        let err = SettingsError::Route("collides with /health".into());
        assert_eq!(err.to_string(), "server.path collides with /health");
    }
}
