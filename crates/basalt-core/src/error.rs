//! Command error types.
//!
//! The `Display` text of each variant is the exact message the client
//! sees after the `-ERR ` (or `-IOERR `) prefix.

use thiserror::Error;

/// Errors produced while executing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The key's meta entry names a different value family than the
    /// command operates on.
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,

    /// A stored value was shorter than its declared header or carried
    /// an unknown discriminator. Fatal to the command, not the session.
    #[error("Invalid data")]
    InvalidData,

    /// A numeric argument or stored value was not a signed 64-bit
    /// integer, or an integer operation would overflow.
    #[error("value is not an integer or out of range")]
    InvalidInt,

    /// A numeric argument or stored value was not a finite float.
    #[error("value is not a valid float")]
    InvalidFloat,

    /// A score arithmetic result was NaN.
    #[error("resulting score is not a number (NaN)")]
    NanScore,

    /// Malformed argument shape, e.g. an unknown option.
    #[error("syntax error")]
    Syntax,

    /// The glob pattern given to KEYS did not compile.
    #[error("invalid pattern for 'keys' command")]
    InvalidPattern,

    /// The command name is not in the table.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The argument count does not satisfy the command's arity.
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// The command body is intentionally not implemented.
    #[error("command not supported")]
    NotSupported,

    /// Engine read or write failure.
    #[error("{0}")]
    Io(String),
}

impl From<rocksdb::Error> for CommandError {
    fn from(err: rocksdb::Error) -> Self {
        CommandError::Io(err.into_string())
    }
}
