//! basalt-protocol: the Redis wire protocol.
//!
//! Parses client requests in both framings the protocol allows
//! (multi-bulk and the older inline form) and encodes replies back
//! into wire frames, including multi-bulk replies whose elements are
//! produced lazily over a channel.
//!
//! The parser operates on a caller-owned buffer and signals an
//! incomplete request by returning `Ok(None)`, letting the caller
//! read more data and retry.

pub mod error;
pub mod parse;
pub mod reply;

pub use error::ProtocolError;
pub use parse::{parse_request, Request};
pub use reply::{send_reply, Reply};
