//! Parser error types.
//!
//! The `Display` text of each variant is the reason string sent to the
//! client as `-ERR Protocol error: <reason>` before the connection is
//! closed.

use thiserror::Error;

/// Errors produced while parsing a client request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A length line started with the wrong prefix byte.
    #[error("invalid length")]
    InvalidLengthPrefix,

    /// A length line exceeded the maximum allowed size without a
    /// terminating CRLF.
    #[error("length line too long")]
    LengthLineTooLong,

    /// A length line was empty.
    #[error("missing length")]
    MissingLength,

    /// A length line did not parse as a decimal integer.
    #[error("length is not a valid integer")]
    InvalidLength,

    /// A multi-bulk header declared a negative or oversized argument count.
    #[error("invalid multibulk count")]
    InvalidMultibulkCount,

    /// A bulk argument declared a negative or oversized byte length.
    #[error("invalid bulk length")]
    InvalidBulkLength,

    /// The two bytes following a bulk argument were not `\r\n`.
    #[error("invalid bulk terminator")]
    InvalidBulkTerminator,
}
