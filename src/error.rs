//! Error types for the PCOM protocols.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::header::Protocol;
use crate::operand::OperandKind;

/// Result type alias for PCOM operations.
pub type Result<T> = std::result::Result<T, PcomError>;

/// Which checksum of a frame failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumScope {
    /// The single checksum of a Protocol A message.
    Message,
    /// The Protocol B header checksum.
    Header,
    /// The Protocol B payload checksum.
    Payload,
}

impl fmt::Display for ChecksumScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumScope::Message => write!(f, "message"),
            ChecksumScope::Header => write!(f, "header"),
            ChecksumScope::Payload => write!(f, "payload"),
        }
    }
}

/// Coarse classification of a [`PcomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid start/end marker, or a malformed frame structure.
    Framing,
    /// Header or payload checksum mismatch.
    Checksum,
    /// Echoed unit id, command, transaction id or protocol tag does not match the request.
    IdentityMismatch,
    /// No data, or an incomplete frame, within the deadline.
    Timeout,
    /// Socket-level failure or use of a closed socket.
    Connection,
    /// Shared-channel re-initialization attempted before its cooldown elapsed.
    Throttled,
    /// Payload present but not parseable into the expected value.
    ValueDecode,
    /// Invalid arguments or an operand not supported by the protocol in use.
    Configuration,
    /// The caller cancelled the operation.
    Cancelled,
}

/// Errors that can occur during PCOM communication.
#[derive(Debug, Error)]
pub enum PcomError {
    /// The frame does not start with the protocol's start marker.
    #[error("{protocol} frame has a missing or invalid start marker")]
    InvalidStx {
        /// Protocol of the rejected frame.
        protocol: Protocol,
    },

    /// The frame does not end with the protocol's terminator.
    #[error("{protocol} frame has a missing or invalid terminator")]
    InvalidEtx {
        /// Protocol of the rejected frame.
        protocol: Protocol,
    },

    /// The frame structure is invalid (length, header flags, block layout).
    #[error("{protocol} framing error: {reason}")]
    Framing {
        /// Protocol of the rejected frame.
        protocol: Protocol,
        /// Description of the framing problem.
        reason: String,
    },

    /// A checksum did not match the frame contents.
    #[error("{protocol} {scope} checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    Checksum {
        /// Protocol of the rejected frame.
        protocol: Protocol,
        /// Which checksum failed.
        scope: ChecksumScope,
        /// Checksum computed over the received bytes.
        expected: u16,
        /// Checksum carried by the frame.
        received: u16,
    },

    /// The response was sent by a different unit.
    #[error("unit ID mismatch: expected {expected}, received {received}")]
    UnitIdMismatch {
        /// Unit id of the request.
        expected: u8,
        /// Unit id echoed by the response.
        received: u8,
    },

    /// The response answers a different command.
    #[error("command mismatch: expected '{expected}', received '{received}'")]
    CommandMismatch {
        /// Command of the request.
        expected: String,
        /// Command echoed by the response.
        received: String,
    },

    /// The Ethernet sub-header carries another transaction id.
    #[error("transaction ID mismatch: expected {expected}, received {received}")]
    TransactionMismatch {
        /// Transaction id of the request.
        expected: u16,
        /// Transaction id echoed by the response.
        received: u16,
    },

    /// The Ethernet sub-header carries another protocol tag.
    #[error("protocol mismatch: expected {expected}, received tag {received}")]
    ProtocolMismatch {
        /// Protocol of the request.
        expected: Protocol,
        /// Raw tag echoed by the response.
        received: u8,
    },

    /// No complete response within the deadline.
    #[error("communication timeout: {reason}")]
    Timeout {
        /// What was still missing when the deadline passed.
        reason: String,
    },

    /// Socket-level failure.
    #[error("connection error: {reason}")]
    Connection {
        /// Description of the failure.
        reason: String,
    },

    /// The channel or transport has been closed.
    #[error("the connection has been closed")]
    Disposed,

    /// Shared-channel initialization requested too soon after a failed attempt.
    #[error("too many initialize attempts for {endpoint}, retry after {retry_after:?}")]
    Throttled {
        /// `host:port` of the shared channel.
        endpoint: String,
        /// Time left before another attempt is allowed.
        retry_after: Duration,
    },

    /// The payload could not be decoded into the expected value.
    #[error("value decode error: {reason}")]
    ValueDecode {
        /// Description of the decode failure.
        reason: String,
    },

    /// Invalid parameter provided.
    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// The operand kind has no command or type code for the operation.
    #[error("{kind} does not support {operation} over {protocol}")]
    UnsupportedOperand {
        /// Operand kind requested.
        kind: OperandKind,
        /// `"read"` or `"write"`.
        operation: &'static str,
        /// Protocol in use.
        protocol: Protocol,
    },

    /// The controller buffer cannot hold a single request block.
    #[error("buffer size {buffer_size} cannot hold a single {protocol} request")]
    BufferTooSmall {
        /// Buffer size supplied to the batcher.
        buffer_size: usize,
        /// Protocol being batched.
        protocol: Protocol,
    },

    /// A request was issued before the client was initialized.
    #[error("the client must be initialized before requests can be processed")]
    NotInitialized,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error annotated with the endpoint and unit it occurred on.
    #[error("{context}: {source}")]
    Context {
        /// Endpoint, unit and protocol description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<PcomError>,
    },
}

impl PcomError {
    /// Creates a new `Framing` error.
    pub fn framing(protocol: Protocol, reason: impl Into<String>) -> Self {
        Self::Framing {
            protocol,
            reason: reason.into(),
        }
    }

    /// Creates a new `Checksum` error.
    pub fn checksum(protocol: Protocol, scope: ChecksumScope, expected: u16, received: u16) -> Self {
        Self::Checksum {
            protocol,
            scope,
            expected,
            received,
        }
    }

    /// Creates a new `CommandMismatch` error.
    pub fn command_mismatch(expected: impl Into<String>, received: impl Into<String>) -> Self {
        Self::CommandMismatch {
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Creates a new `Timeout` error.
    ///
    /// # Example
    ///
    /// ```
    /// use unitronics_pcom::PcomError;
    ///
    /// let err = PcomError::timeout("no data received");
    /// assert_eq!(err.to_string(), "communication timeout: no data received");
    /// ```
    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout {
            reason: reason.into(),
        }
    }

    /// Creates a new `Connection` error.
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Creates a new `ValueDecode` error.
    pub fn value_decode(reason: impl Into<String>) -> Self {
        Self::ValueDecode {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    ///
    /// # Example
    ///
    /// ```
    /// use unitronics_pcom::PcomError;
    ///
    /// let err = PcomError::invalid_parameter("timeout", "must be greater than 0");
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Wraps this error with a context description.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the error with any `Context` layers removed.
    pub fn root(&self) -> &PcomError {
        match self {
            PcomError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            PcomError::InvalidStx { .. }
            | PcomError::InvalidEtx { .. }
            | PcomError::Framing { .. } => ErrorCategory::Framing,
            PcomError::Checksum { .. } => ErrorCategory::Checksum,
            PcomError::UnitIdMismatch { .. }
            | PcomError::CommandMismatch { .. }
            | PcomError::TransactionMismatch { .. }
            | PcomError::ProtocolMismatch { .. } => ErrorCategory::IdentityMismatch,
            PcomError::Timeout { .. } => ErrorCategory::Timeout,
            PcomError::Connection { .. } | PcomError::Disposed | PcomError::Io(_) => {
                ErrorCategory::Connection
            }
            PcomError::Throttled { .. } => ErrorCategory::Throttled,
            PcomError::ValueDecode { .. } => ErrorCategory::ValueDecode,
            PcomError::InvalidParameter { .. }
            | PcomError::UnsupportedOperand { .. }
            | PcomError::BufferTooSmall { .. }
            | PcomError::NotInitialized => ErrorCategory::Configuration,
            PcomError::Cancelled => ErrorCategory::Cancelled,
            // root() never returns a Context
            PcomError::Context { .. } => ErrorCategory::Configuration,
        }
    }

    /// Returns `true` for timeout and connection failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::Connection
        )
    }
}
