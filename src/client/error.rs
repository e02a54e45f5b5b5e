//! Error types for client operations.

use std::io;

use crate::protocol::{ErrorCategory, Rejection};

/// Errors emitted by [`crate::client::ExtractorClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport or codec error.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The peer closed the connection before a response arrived.
    #[error("connection closed by peer")]
    Disconnected,
    /// The server rejected a unary request.
    #[error("request rejected ({category:?}): {message}")]
    Rejected {
        /// Failure category reported by the server.
        category: ErrorCategory,
        /// Server-provided description.
        message: String,
    },
    /// A streaming exchange ended with an `ERROR` status.
    #[error("conversion failed: {0}")]
    Failed(String),
    /// The server's frames broke the streaming ordering contract.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The server answered with a message of the wrong kind.
    #[error("unexpected reply: expected {expected}")]
    UnexpectedReply {
        /// Reply kind the call was waiting for.
        expected: &'static str,
    },
}

impl From<Rejection> for ClientError {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected {
            category: rejection.category,
            message: rejection.message,
        }
    }
}
