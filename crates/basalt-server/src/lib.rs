//! basalt-server: the network layer.
//!
//! Accepts TCP connections and runs one session per client. A session
//! parses requests, executes them through the core dispatcher on a
//! blocking thread, and pushes encoded reply frames through a queue
//! task to a writer task.

pub mod server;
pub mod session;

pub use server::{run, serve, Sessions};
pub use session::SessionHandle;
