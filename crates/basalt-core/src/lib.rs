//! basalt-core: the storage core of the server.
//!
//! Owns the keyspace encoding, the engine facade over the ordered
//! store, the per-key lockring, and the command table that ties them
//! together. The network layer hands a parsed argument vector to
//! [`Db::execute`] and gets a reply value back.

pub mod codec;
pub mod command;
pub mod engine;
pub mod error;
pub mod keyspace;
pub mod lockring;

pub use command::{CommandSpec, Db};
pub use engine::{Engine, Scan, View, WriteBatch};
pub use error::CommandError;
pub use lockring::LockRing;
