use async_trait::async_trait;
use ringway_node::NodeLocator;
use ringway_rpc::{Code, Connection, Dialer, Handler, Message, Request};
use tracing::{debug, warn};

use crate::binding::attach_binding;
use crate::classify::{classify, MessageKind};
use crate::error::GatewayError;
use crate::pool::{ConnectionPool, EvictClosed};

/// The payload of the reply to a message which could not be classified.
pub const UNKNOWN_REQUEST: &str = "unknown request";

/// Relays messages between clients and the backends owning their routing keys.
///
/// Client requests carrying a `key` are forwarded to the ring member owning
/// the key, tagged with the client's address. A backend may later push a
/// message tagged with that address back through the gateway, which is then
/// relayed to the client over the connection it originally opened.
///
/// The redirector must have its backend connector bound through
/// [Redirector::bind_connector] before it can route requests.
pub struct Redirector<L> {
    locator: L,
    backends: ConnectionPool<Connection>,
    clients: ConnectionPool<Connection>,
}

impl<L: NodeLocator> Redirector<L> {
    /// Creates a new redirector resolving backends with the given locator.
    pub fn new(locator: L) -> Self {
        Self {
            locator,
            backends: ConnectionPool::with_eviction_policy(EvictClosed),
            clients: ConnectionPool::with_eviction_policy(EvictClosed),
        }
    }

    /// Binds the dialer used to reach backends.
    ///
    /// Backends may push messages over connections opened by this dialer, so
    /// the dialer should serve inbound calls with this redirector.
    pub fn bind_connector(&self, dialer: Dialer) -> Result<(), GatewayError> {
        self.backends.bind_connector(dialer)
    }

    #[inline]
    /// The connections to backend nodes keyed by their service address.
    pub fn backends(&self) -> &ConnectionPool<Connection> {
        &self.backends
    }

    #[inline]
    /// The connections clients have opened, keyed by the client's address.
    pub fn clients(&self) -> &ConnectionPool<Connection> {
        &self.clients
    }

    /// Handles a single inbound message, producing the reply for its sender.
    pub async fn handle(&self, request: Request) -> Message {
        let kind = match classify(request.message()) {
            Ok(kind) => kind,
            Err(e) => return abort(&request, e),
        };

        let result = match kind {
            MessageKind::RouteByKey { key } => self.route_by_key(&request, &key).await,
            MessageKind::PushToClient { binding } => {
                self.push_to_client(&request, &binding).await
            },
            MessageKind::Unknown => {
                warn!(
                    remote_addr = %request.remote_addr(),
                    path = %request.message().path(),
                    "Rejecting message without a routing key or binding."
                );
                return Message::response(Code::NotImplemented, UNKNOWN_REQUEST);
            },
        };

        result.unwrap_or_else(|e| abort(&request, e))
    }

    async fn route_by_key(&self, request: &Request, key: &str) -> Result<Message, GatewayError> {
        let member = self.locator.get_node(key.as_bytes())?;

        let binding = request.remote_addr().to_string();
        self.clients
            .register(binding.clone(), request.connection().clone());

        let backend = self
            .backends
            .get_or_create(&member.public_addr.to_string())
            .await?;

        let mut outbound = request.message().clone();
        attach_binding(&mut outbound, &binding);

        debug!(
            key = %key,
            node_id = %member.node_id,
            backend_addr = %member.public_addr,
            binding = %binding,
            "Forwarding message to backend."
        );
        let reply = backend.call(&outbound).await?;

        Ok(Message::response(reply.code(), reply.payload()))
    }

    async fn push_to_client(
        &self,
        request: &Request,
        binding: &str,
    ) -> Result<Message, GatewayError> {
        let client = self
            .clients
            .get(binding)
            .ok_or_else(|| GatewayError::ClientNotKnown(binding.to_string()))?;

        debug!(
            remote_addr = %request.remote_addr(),
            binding = %binding,
            "Relaying push to client."
        );
        let reply = client.call(request.message()).await?;

        Ok(Message::response(reply.code(), reply.payload()))
    }
}

#[async_trait]
impl<L: NodeLocator> Handler for Redirector<L> {
    async fn on_message(&self, request: Request) -> Message {
        self.handle(request).await
    }
}

fn abort(request: &Request, error: GatewayError) -> Message {
    warn!(
        remote_addr = %request.remote_addr(),
        path = %request.message().path(),
        error = %error,
        "Aborting message."
    );
    Message::response(Code::InternalServerError, error.to_string())
}
