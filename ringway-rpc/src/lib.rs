//! A small symmetric message transport.
//!
//! Every [Connection] is a single TCP session over which *either* peer may
//! issue requests and wait for the correlated reply. This is what allows a
//! gateway to relay a message back to a client over the same session the
//! client originally opened.

#[macro_use]
extern crate tracing;

mod handler;
mod message;
mod net;
mod request;
mod server;

pub const SCRATCH_SPACE: usize = 4096;

pub use async_trait::async_trait;
pub use handler::Handler;
pub use message::{Code, Message, MessageOption};
pub use net::{
    ArchivedErrorCode,
    ArchivedStatus,
    Connection,
    ErrorCode,
    Status,
    MAX_FRAME_SIZE,
};
pub use request::Request;
pub use server::{Dialer, Server};
