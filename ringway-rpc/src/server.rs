use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::{Connection, Handler};

/// A message server instance.
///
/// Each accepted connection is answered by the server's handler. Connections
/// opened through the server's [Dialer] are answered by the same handler, so
/// peers dialed by the server may call back into it.
pub struct Server {
    local_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    handle: JoinHandle<()>,
}

impl Server {
    /// Binds to the given address and spawns the accept loop.
    pub async fn listen(addr: SocketAddr, handler: Arc<dyn Handler>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!(listen_addr = %local_addr, "Server is listening for connections.");

        let handle = tokio::spawn(accept_connections(listener, handler.clone()));

        Ok(Self {
            local_addr,
            handler,
            handle,
        })
    }

    #[inline]
    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Creates a dialer which opens connections answered by this server's handler.
    pub fn dialer(&self) -> Dialer {
        Dialer {
            handler: self.handler.clone(),
        }
    }

    /// Signals the server to stop accepting connections.
    ///
    /// Connections which are already established are left running.
    pub fn shutdown(&self) {
        info!(listen_addr = %self.local_addr, "Server is shutting down.");
        self.handle.abort();
    }
}

#[derive(Clone)]
/// Opens outbound connections which serve inbound calls with a fixed handler.
pub struct Dialer {
    handler: Arc<dyn Handler>,
}

impl Dialer {
    /// Creates a dialer for the given handler.
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }

    /// Connects to a remote peer.
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<Connection> {
        trace!(addr = %addr, "Dialing peer.");
        Connection::connect(addr, self.handler.clone()).await
    }
}

async fn accept_connections(listener: TcpListener, handler: Arc<dyn Handler>) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = ?e, "Failed to accept connection.");
                continue;
            },
        };

        match Connection::start(stream, handler.clone()) {
            Ok(_) => debug!(remote_addr = %remote_addr, "Accepted connection."),
            Err(e) => {
                warn!(remote_addr = %remote_addr, error = ?e, "Failed to start connection.");
            },
        }
    }
}
