//! Error types for the transport library.
//!
//! This module defines the error surface used throughout the crate, using
//! `thiserror` for ergonomic error handling at the library boundary. The
//! CLI binary wraps these in `anyhow::Result` rather than matching on them.

use thiserror::Error;

use crate::codec::Fault;

/// Errors produced by sessions, the dispatcher, and the TLS layer.
#[derive(Error, Debug)]
pub enum RpcError {
    /// A read or write against the underlying socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A value could not be serialized to or deserialized from JSON.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The peer answered a call with an error outcome.
    #[error("protocol fault: {0}")]
    Protocol(#[from] Fault),

    /// No response arrived within the session's configured request timeout.
    #[error("request `{method}` timed out")]
    Timeout { method: String },

    /// The session was torn down (locally or by the peer) before this call
    /// could complete.
    #[error("connection closed")]
    ConnectionClosed,

    /// The caller violated a local invariant, e.g. supplying both
    /// positional and named parameters to the same call.
    #[error("local misuse: {0}")]
    LocalMisuse(String),

    /// TLS handshake, certificate, or key-material failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias for library-internal fallible operations.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_names_the_method() {
        let err = RpcError::Timeout {
            method: "echo".to_string(),
        };
        assert_eq!(err.to_string(), "request `echo` timed out");
    }

    #[test]
    fn protocol_fault_converts_from_fault() {
        let fault = Fault::method_not_found();
        let err: RpcError = fault.clone().into();
        match err {
            RpcError::Protocol(f) => assert_eq!(f, fault),
            other => panic!("expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RpcError>();
    }
}
