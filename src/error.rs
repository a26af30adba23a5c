//! Error types for the gateway.

use std::time::Duration;

use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Method not handled by the router.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// No free port below the search ceiling.
    #[error("could not find available port after checking {checked} ports from {start}")]
    PortsExhausted {
        /// First port probed.
        start: u16,
        /// Number of ports probed.
        checked: u16,
    },

    /// The tunnel helper failed to come up.
    #[error("tunnel failed: {0}")]
    Tunnel(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::UnknownMethod(_) => codes::INTERNAL_ERROR,
            Error::InvalidParams(_) => codes::INVALID_PARAMS,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::PortsExhausted { .. } | Error::Tunnel(_) | Error::Io(_) => -32002,
        }
    }
}

/// Outcome of a forwarded tool call that did not produce a result.
///
/// These are tool-domain failures: the router renders them as `isError`
/// content, never as JSON-RPC errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// No live extension connection.
    #[error("Browser Extension not connected. Make sure the extension is installed and active.")]
    NotConnected,

    /// No correlated response arrived in time.
    #[error("Tool call timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The extension reported an error for the call.
    #[error("{0}")]
    Tool(String),

    /// The pending entry was dropped without being settled.
    #[error("call was abandoned before completion")]
    Closed,
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_method_maps_to_internal_error() {
        let err = Error::UnknownMethod("bogus/method".into());
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
        assert_eq!(err.to_string(), "Unknown method: bogus/method");
    }

    #[test]
    fn timeout_message_names_duration() {
        let err = CallError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Tool call timeout after 30s");
    }
}
