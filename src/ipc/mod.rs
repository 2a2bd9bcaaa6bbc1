//! IPC module for status displays

mod protocol;
mod server;

pub use protocol::{Request, Response, SessionStatus};
pub use server::Server;
