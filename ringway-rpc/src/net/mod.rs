mod status;
pub(crate) mod utils;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rkyv::AlignedVec;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

pub use status::{ArchivedErrorCode, ArchivedStatus, ErrorCode, Status};
pub use utils::MAX_FRAME_SIZE;

use crate::net::utils::{FrameHeader, FrameKind, HEADER_SIZE};
use crate::{Handler, Message, Request};

type PendingReply = oneshot::Sender<Result<Message, Status>>;

#[derive(Clone)]
/// A live session with a single peer.
///
/// This is a cheap to clone handle, every clone refers to the same underlying
/// socket. Both peers of a connection can issue calls over it, inbound calls
/// are answered by the [Handler] the connection was started with.
pub struct Connection(Arc<ConnectionInner>);

struct ConnectionInner {
    remote_addr: SocketAddr,
    next_id: AtomicU64,
    closed: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote_addr", &self.0.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connects to a remote peer.
    ///
    /// Any calls the remote peer makes over this connection are answered by `handler`.
    pub async fn connect(
        remote_addr: SocketAddr,
        handler: Arc<dyn Handler>,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(remote_addr).await?;
        Self::start(stream, handler)
    }

    /// Starts running a connection over an already established stream.
    pub(crate) fn start(stream: TcpStream, handler: Arc<dyn Handler>) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let remote_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let conn = Self(Arc::new(ConnectionInner {
            remote_addr,
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            outbound: Mutex::new(Some(tx)),
            pending: Mutex::new(HashMap::new()),
        }));

        tokio::spawn(write_frames(remote_addr, writer, rx));
        tokio::spawn(read_frames(conn.clone(), reader, handler));

        trace!(remote_addr = %remote_addr, "Connection started.");

        Ok(conn)
    }

    #[inline]
    /// The address of the remote peer.
    pub fn remote_addr(&self) -> SocketAddr {
        self.0.remote_addr
    }

    #[inline]
    /// Returns if the connection has been closed.
    ///
    /// A closed connection can never be used to make calls again.
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    /// Sends a request to the remote peer and waits for its reply.
    pub async fn call(&self, msg: &Message) -> Result<Message, Status> {
        if self.is_closed() {
            return Err(Status::closed());
        }

        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = utils::serialize_request(id, msg)?;

        let (tx, rx) = oneshot::channel();
        self.0.pending.lock().insert(id, tx);

        // The connection may have been torn down after the first check,
        // in which case the pending set has already been drained.
        if self.is_closed() {
            self.0.pending.lock().remove(&id);
            return Err(Status::closed());
        }

        if !self.try_send_frame(frame) {
            self.0.pending.lock().remove(&id);
            return Err(Status::closed());
        }

        rx.await.map_err(|_| Status::closed())?
    }

    /// Closes the connection, failing any outstanding calls.
    pub fn close(&self) {
        self.mark_closed();
    }

    fn send_frame(&self, frame: Bytes) {
        if !self.try_send_frame(frame) {
            debug!(remote_addr = %self.remote_addr(), "Dropping frame for closed connection.");
        }
    }

    fn try_send_frame(&self, frame: Bytes) -> bool {
        match self.0.outbound.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    fn complete(&self, id: u64, reply: Result<Message, Status>) {
        let tx = self.0.pending.lock().remove(&id);
        match tx {
            Some(tx) => {
                let _ = tx.send(reply);
            },
            None => {
                warn!(
                    remote_addr = %self.remote_addr(),
                    id = id,
                    "Received a reply for an unknown request.",
                );
            },
        }
    }

    fn mark_closed(&self) {
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the sender stops the writer, which shuts down our half of the socket.
        self.0.outbound.lock().take();

        let pending = std::mem::take(&mut *self.0.pending.lock());
        for (_, tx) in pending {
            let _ = tx.send(Err(Status::closed()));
        }

        debug!(remote_addr = %self.remote_addr(), "Connection closed.");
    }
}

/// Writes all queued frames to the socket until every handle is dropped
/// or the socket fails.
async fn write_frames(
    remote_addr: SocketAddr,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!(remote_addr = %remote_addr, error = ?e, "Failed to write frame.");
            break;
        }
    }

    let _ = writer.shutdown().await;
}

/// Reads frames from the socket until it is closed, dispatching each inbound
/// request to its own task.
async fn read_frames(conn: Connection, reader: OwnedReadHalf, handler: Arc<dyn Handler>) {
    let mut reader = BufReader::new(reader);

    loop {
        if conn.is_closed() {
            break;
        }

        let (header, body) = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(
                    remote_addr = %conn.remote_addr(),
                    error = ?e,
                    "Failed to read frame, closing connection.",
                );
                break;
            },
        };

        match header.kind {
            FrameKind::Request => {
                let message: Message = match rkyv::from_bytes(&body) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(error = ?e, "Received request which could not be deserialized.");
                        conn.send_frame(utils::serialize_error(header.id, &Status::invalid()));
                        continue;
                    },
                };

                tokio::spawn(handle_request(
                    conn.clone(),
                    handler.clone(),
                    header.id,
                    message,
                ));
            },
            FrameKind::Response => {
                let reply = rkyv::from_bytes::<Message>(&body).map_err(|_| Status::invalid());
                conn.complete(header.id, reply);
            },
            FrameKind::Error => {
                let status = if body.is_empty() {
                    Status::internal("Remote peer failed without providing a reason.")
                } else {
                    rkyv::from_bytes::<Status>(&body).unwrap_or_else(|_| Status::invalid())
                };
                conn.complete(header.id, Err(status));
            },
        }
    }

    conn.mark_closed();
}

/// Reads a single frame, returning `None` if the peer closed the stream cleanly.
async fn read_frame(
    reader: &mut BufReader<OwnedReadHalf>,
) -> io::Result<Option<(FrameHeader, AlignedVec)>> {
    let mut head = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut head).await {
        Ok(_) => {},
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let header = utils::parse_header(&head)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "Invalid frame header"))?;

    let mut body = AlignedVec::with_capacity(header.len);
    body.resize(header.len, 0);
    reader.read_exact(body.as_mut_slice()).await?;

    if !utils::verify_checksum(&header, &body) {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "Frame checksum does not match its body",
        ));
    }

    Ok(Some((header, body)))
}

/// Runs the handler for a single inbound request and writes back the reply.
async fn handle_request(
    conn: Connection,
    handler: Arc<dyn Handler>,
    id: u64,
    message: Message,
) {
    let request = Request::new(conn.clone(), message);
    let task = tokio::spawn(async move { handler.on_message(request).await });

    let frame = match task.await {
        Ok(reply) => utils::serialize_response(id, &reply)
            .unwrap_or_else(|status| utils::serialize_error(id, &status)),
        Err(e) => {
            error!(
                remote_addr = %conn.remote_addr(),
                error = ?e,
                "Handler failed to produce a reply.",
            );
            utils::serialize_error(id, &Status::internal("Handler failed to produce a reply."))
        },
    };

    conn.send_frame(frame);
}
