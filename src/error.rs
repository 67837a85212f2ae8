//! Error types for flowplug.
//!
//! All errors are represented by the `PluginError` enum. Codec failures carry the
//! path of the field that failed (`node.do[1].with`, `context.secrets`, ...) so
//! a failure can be diagnosed without looking at the transport.

use std::io::ErrorKind;

use thiserror::Error;
use tonic::{Code, Status};

use crate::handshake;

/// Unified error type for all flowplug operations.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A dynamic value could not be serialized into its blob.
    #[error("failed to encode '{field}': {source}")]
    Encode {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// A received blob is malformed or does not match the expected shape.
    #[error("failed to decode '{field}': {source}")]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// The peer returned a failure, or the call itself failed in flight.
    #[error("remote error ({code:?}): {message}")]
    Remote {
        code: Code,
        message: String,
    },

    /// The connection to the plugin could not be established.
    #[error("transport error: {0}")]
    Transport(String),

    /// Handshake mismatch between host and plugin.
    #[error("incompatible plugin: {0}")]
    IncompatibleVersion(String),

    /// The negotiated transport is not the gRPC transport.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Node definition errors.
    #[error("{0}")]
    Node(String),

    /// Failure reported by a node executor implementation.
    #[error("{0}")]
    Execution(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl PluginError {
    pub(crate) fn encode(
        field: impl Into<String>,
        source: serde_json::Error,
    ) -> Self {
        PluginError::Encode {
            field: field.into(),
            source,
        }
    }

    pub(crate) fn decode(
        field: impl Into<String>,
        source: serde_json::Error,
    ) -> Self {
        PluginError::Decode {
            field: field.into(),
            source,
        }
    }

    /// Status code of a remote failure, if this is one.
    pub fn code(&self) -> Option<Code> {
        match self {
            PluginError::Remote {
                code,
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

impl From<PluginError> for String {
    fn from(val: PluginError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for PluginError {
    fn from(error: std::io::Error) -> Self {
        PluginError::IoError(error.to_string())
    }
}

impl From<PluginError> for std::io::Error {
    fn from(val: PluginError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<tonic::transport::Error> for PluginError {
    fn from(error: tonic::transport::Error) -> Self {
        PluginError::Transport(error.to_string())
    }
}

impl From<Status> for PluginError {
    fn from(status: Status) -> Self {
        // executors may fail with FailedPrecondition too, only the guard's tagged status is a handshake failure
        if handshake::is_rejection(&status) {
            return PluginError::IncompatibleVersion(status.message().to_string());
        }
        PluginError::Remote {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<PluginError> for Status {
    fn from(error: PluginError) -> Self {
        match error {
            PluginError::Decode {
                ..
            } => Status::invalid_argument(error.to_string()),
            PluginError::Encode {
                ..
            } => Status::internal(error.to_string()),
            PluginError::Remote {
                code,
                message,
            } => Status::new(code, message),
            PluginError::IncompatibleVersion(message) => Status::failed_precondition(message),
            PluginError::UnsupportedTransport(message) => Status::unimplemented(message),
            other => Status::unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_keeps_message_across_status() {
        let status: Status = PluginError::Execution("database unreachable".to_string()).into();
        assert_eq!(status.code(), Code::Unknown);

        let err = PluginError::from(status);
        assert_eq!(err.code(), Some(Code::Unknown));
        assert_eq!(err.to_string(), "remote error (Unknown): database unreachable");
    }

    #[test]
    fn test_executor_incompatible_version_stays_remote() {
        let status: Status = PluginError::IncompatibleVersion("downstream db schema v3 required".to_string()).into();
        assert_eq!(status.code(), Code::FailedPrecondition);

        let err = PluginError::from(status);
        assert!(matches!(
            err,
            PluginError::Remote {
                code: Code::FailedPrecondition,
                ref message,
            } if message == "downstream db schema v3 required"
        ));
    }

    #[test]
    fn test_guard_rejection_is_incompatible() {
        let mut guard = handshake::HandshakeGuard::new(handshake::HandshakeConfig::default());
        let status = tonic::service::Interceptor::call(&mut guard, tonic::Request::new(())).unwrap_err();

        let err = PluginError::from(status);
        assert!(matches!(err, PluginError::IncompatibleVersion(msg) if msg.contains("missing protocol version")));
    }

    #[test]
    fn test_decode_error_names_field() {
        let source = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let err = PluginError::decode("node.do[0].with", source);
        assert!(err.to_string().starts_with("failed to decode 'node.do[0].with'"));

        let status = Status::from(err);
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}
