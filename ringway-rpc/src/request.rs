use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;

use crate::{Connection, Message};

/// An inbound request along with the connection it arrived on.
///
/// The connection handle can be kept past the lifetime of the request in
/// order to call back to the peer later on.
pub struct Request {
    pub(crate) conn: Connection,
    pub(crate) message: Message,
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("message", &self.message)
            .field("remote_addr", &self.remote_addr())
            .finish()
    }
}

impl Request {
    pub(crate) fn new(conn: Connection, message: Message) -> Self {
        Self { conn, message }
    }

    /// The remote address of the incoming message.
    pub fn remote_addr(&self) -> SocketAddr {
        self.conn.remote_addr()
    }

    /// The connection the request arrived on.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The request message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Consumes the request into its message.
    pub fn into_message(self) -> Message {
        self.message
    }
}
