//! Error types for adventure-mcp.
//!
//! Domain-level failures (rejected transitions, schema violations) live next
//! to the code that produces them. This module holds the errors that cross
//! module boundaries: configuration, transport, and the dispatcher taxonomy
//! that is turned into JSON-RPC error responses.

use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;

use crate::capability::{CapabilityError, ValidationError};
use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcErrorData, RequestId};
use crate::session::SessionId;

/// JSON-RPC error code for a referenced session that does not exist.
pub const SESSION_NOT_FOUND: i32 = -32001;

/// JSON-RPC error code for a capability that is unknown or not visible.
pub const CAPABILITY_NOT_FOUND: i32 = -32002;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while handing a message to the transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The receiving side of the outbound queue is gone.
    #[error("outbound channel closed")]
    ChannelClosed,

    /// The message could not be serialised.
    #[error("failed to serialise outgoing message")]
    Serialise(#[source] serde_json::Error),

    /// Writing to the underlying stream failed.
    #[error("failed to write message")]
    Io(#[from] std::io::Error),
}

/// Failures a request handler can report back to the client.
///
/// Every variant maps onto exactly one JSON-RPC error response; see
/// [`DispatchError::into_rpc`].
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The method name is not in the dispatch table.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The envelope or its params could not be understood.
    #[error("{0}")]
    InvalidParams(String),

    /// A session id was supplied but no such session exists.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Arguments failed the capability's parameter schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The named capability is unknown or not currently visible.
    #[error("{kind} not found: {name}")]
    CapabilityNotFound {
        /// Capability kind, as shown to the client ("Action", "Template", "Resource").
        kind: &'static str,
        /// The name or uri that was requested.
        name: String,
    },

    /// Anything the handler did not anticipate.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Converts this failure into a JSON-RPC error response for `id`.
    #[must_use]
    pub fn into_rpc(self, id: RequestId) -> JsonRpcError {
        let data = match &self {
            Self::MethodNotFound(_) => {
                JsonRpcErrorData::with_message(ErrorCode::MethodNotFound, self.to_string())
            }
            Self::InvalidParams(_) => {
                JsonRpcErrorData::with_message(ErrorCode::InvalidParams, self.to_string())
            }
            Self::SessionNotFound(session) => JsonRpcErrorData::with_message(
                ErrorCode::ServerError(SESSION_NOT_FOUND),
                self.to_string(),
            )
            .with_data(json!({ "sessionId": session.as_str() })),
            Self::Validation(err) => {
                JsonRpcErrorData::with_message(ErrorCode::InvalidParams, err.to_string())
                    .with_data(json!({
                        "parameter": err.parameter(),
                        "problem": err.problem(),
                    }))
            }
            Self::CapabilityNotFound { .. } => JsonRpcErrorData::with_message(
                ErrorCode::ServerError(CAPABILITY_NOT_FOUND),
                self.to_string(),
            ),
            Self::Internal(message) => {
                tracing::error!(error = %message, "request failed with internal error");
                JsonRpcErrorData::from_code(ErrorCode::InternalError)
            }
        };

        JsonRpcError::new(Some(id), data)
    }
}

impl From<CapabilityError> for DispatchError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::NotFound { kind, name } => Self::CapabilityNotFound {
                kind: kind.label(),
                name,
            },
            CapabilityError::Validation(err) => Self::Validation(err),
            CapabilityError::UnknownSession(session) => Self::SessionNotFound(session),
        }
    }
}
