use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ringway_rpc::{Connection, Dialer, Status};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::GatewayError;

#[async_trait]
/// Opens new connections on behalf of a [ConnectionPool].
pub trait Connector<C>: Send + Sync + 'static {
    /// Resolves the address and dials it.
    async fn connect(&self, addr: &str) -> Result<C, Status>;
}

#[async_trait]
impl Connector<Connection> for Dialer {
    async fn connect(&self, addr: &str) -> Result<Connection, Status> {
        let resolved = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| Status::connection(format!("failed to resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| Status::connection(format!("{addr} did not resolve to any address")))?;

        Dialer::connect(self, resolved)
            .await
            .map_err(|e| Status::connection(format!("failed to connect to {addr}: {e}")))
    }
}

/// Decides when a cached connection should no longer be handed out.
pub trait EvictionPolicy<C>: Send + Sync + 'static {
    /// Returns `true` if the cached connection should be dropped.
    fn should_evict(&self, conn: &C) -> bool;
}

#[derive(Debug, Default, Copy, Clone)]
/// Keeps every connection for the life of the pool.
pub struct NeverEvict;

impl<C> EvictionPolicy<C> for NeverEvict {
    fn should_evict(&self, _conn: &C) -> bool {
        false
    }
}

#[derive(Debug, Default, Copy, Clone)]
/// Drops connections once the underlying session has closed.
pub struct EvictClosed;

impl EvictionPolicy<Connection> for EvictClosed {
    fn should_evict(&self, conn: &Connection) -> bool {
        conn.is_closed()
    }
}

/// A cache of live connections keyed by peer address.
///
/// Connections are created lazily through a [Connector] which is bound once,
/// after the pool has been built. Pools without a connector only hold
/// connections handed to them through [ConnectionPool::register].
pub struct ConnectionPool<C> {
    connector: OnceCell<Arc<dyn Connector<C>>>,
    connections: Mutex<HashMap<String, C>>,
    eviction_policy: Box<dyn EvictionPolicy<C>>,
}

impl<C> Default for ConnectionPool<C>
where
    C: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ConnectionPool<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Creates a new pool which never evicts connections.
    pub fn new() -> Self {
        Self::with_eviction_policy(NeverEvict)
    }

    /// Creates a new pool using the given eviction policy.
    pub fn with_eviction_policy(policy: impl EvictionPolicy<C>) -> Self {
        Self {
            connector: OnceCell::new(),
            connections: Mutex::new(HashMap::new()),
            eviction_policy: Box::new(policy),
        }
    }

    /// Binds the connector used to create new connections.
    ///
    /// This can only be done once.
    pub fn bind_connector(&self, connector: impl Connector<C>) -> Result<(), GatewayError> {
        self.connector
            .set(Arc::new(connector))
            .map_err(|_| GatewayError::AlreadyConfigured)
    }

    /// Returns the cached connection for `addr` or dials a new one.
    ///
    /// The lock is never held while dialing. If another caller cached a
    /// connection for the same address in the meantime, theirs is kept and
    /// returned instead. Failed dials are never cached.
    pub async fn get_or_create(&self, addr: &str) -> Result<C, GatewayError> {
        if let Some(conn) = self.get(addr) {
            return Ok(conn);
        }

        let connector = self.connector.get().ok_or(GatewayError::NotConfigured)?;

        trace!(addr = %addr, "Creating new connection.");
        let conn = connector.connect(addr).await?;

        let mut connections = self.connections.lock();
        match connections.entry(addr.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.eviction_policy.should_evict(entry.get()) {
                    entry.insert(conn.clone());
                    Ok(conn)
                } else {
                    debug!(addr = %addr, "Connection was created concurrently, discarding ours.");
                    Ok(entry.get().clone())
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(conn.clone());
                Ok(conn)
            },
        }
    }

    /// Returns the cached connection for `addr` without dialing.
    pub fn get(&self, addr: &str) -> Option<C> {
        let mut connections = self.connections.lock();
        let conn = connections.get(addr)?;

        if self.eviction_policy.should_evict(conn) {
            trace!(addr = %addr, "Evicting cached connection.");
            connections.remove(addr);
            return None;
        }

        Some(conn.clone())
    }

    /// Stores a connection which was established by the peer.
    ///
    /// A live connection which is already cached for the address is kept.
    pub fn register(&self, addr: impl Into<String>, conn: C) {
        let mut connections = self.connections.lock();
        match connections.entry(addr.into()) {
            Entry::Occupied(mut entry) => {
                if self.eviction_policy.should_evict(entry.get()) {
                    entry.insert(conn);
                }
            },
            Entry::Vacant(entry) => {
                trace!(addr = %entry.key(), "Registering connection.");
                entry.insert(conn);
            },
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}
