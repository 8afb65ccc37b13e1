//! Cluster membership for ringway.
//!
//! Nodes discover one another over chitchat's gossip protocol, each advertising
//! a [Role] and the address of its message service. Members with the
//! [Role::RingMember] role are placed on a [Ring] which maps routing keys onto
//! the node owning them.

mod error;
mod member_ring;
mod node;
mod ring;
mod role;
mod statistics;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chitchat::transport::{Transport, UdpTransport};
pub use chitchat::FailureDetectorConfig;
pub use error::{NodeError, RingError};
use futures::StreamExt;
pub use member_ring::{MemberRing, NodeLocator};
pub use node::{ChitchatNode, ClusterMember, NodeMembership};
pub use ring::{hash_key, Ring, RingEntry};
pub use role::Role;
pub use statistics::ClusterStatistics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

/// The unique name of a node within the cluster.
pub type NodeId = String;

pub static DEFAULT_CLUSTER_ID: &str = "ringway-cluster-unknown";

/// Build a ringway node using provided settings.
pub struct RingwayNodeBuilder {
    node_id: NodeId,
    connection_cfg: ConnectionConfig,
    cluster_id: String,
    role: Role,
    failure_detector_config: FailureDetectorConfig,
}

impl RingwayNodeBuilder {
    /// Create a new node builder.
    ///
    /// Nodes join as a [Role::RingMember] unless told otherwise.
    pub fn new(node_id: impl Into<NodeId>, connection_cfg: ConnectionConfig) -> Self {
        Self {
            node_id: node_id.into(),
            connection_cfg,
            cluster_id: DEFAULT_CLUSTER_ID.to_string(),
            role: Role::RingMember,
            failure_detector_config: FailureDetectorConfig::default(),
        }
    }

    /// Set the cluster id for the given node.
    pub fn with_cluster_id(mut self, cluster_id: impl Display) -> Self {
        self.cluster_id = cluster_id.to_string();
        self
    }

    /// Set the role the node advertises to the rest of the cluster.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the failure detector settings used to decide when peers are dead.
    pub fn with_failure_detector_config(mut self, cfg: FailureDetectorConfig) -> Self {
        self.failure_detector_config = cfg;
        self
    }

    /// Starts the node, gossiping over UDP with the targeted seed nodes.
    ///
    /// When connecting to the cluster, the `node_id` **must be unique** otherwise
    /// the cluster will incorrectly propagate state and not become consistent.
    ///
    /// No seed nodes need to be live at the time of connecting for the node to start
    /// correctly, but they are required in order for nodes to discover one-another.
    pub async fn connect(self) -> Result<RingwayNode, NodeError> {
        self.connect_with_transport(&UdpTransport).await
    }

    /// Starts the node using a custom gossip transport.
    pub async fn connect_with_transport(
        self,
        transport: &dyn Transport,
    ) -> Result<RingwayNode, NodeError> {
        let statistics = ClusterStatistics::default();

        let me = ClusterMember::new(
            self.node_id.clone(),
            self.connection_cfg.public_addr,
            self.connection_cfg.service_addr,
            self.role,
        );
        let node = ChitchatNode::connect(
            me,
            self.connection_cfg.listen_addr,
            self.cluster_id.clone(),
            self.connection_cfg.seed_nodes,
            self.failure_detector_config,
            transport,
            statistics.clone(),
        )
        .await?;

        let ring = Arc::new(Ring::default());
        let initial_members = node.members();
        ring.join(initial_members.values());
        statistics
            .num_ring_members
            .store(ring.len() as u64, Ordering::Relaxed);

        let (ring_members_tx, ring_members) = watch::channel(initial_members.clone());
        let (changes_tx, membership_changes) = watch::channel(MembershipChange::default());
        let watcher = tokio::spawn(watch_membership_changes(
            self.node_id.clone(),
            ring.clone(),
            statistics,
            initial_members,
            node.member_change_watcher(),
            ring_members_tx,
            changes_tx,
        ));

        info!(
            node_id = %self.node_id,
            cluster_id = %self.cluster_id,
            role = %self.role,
            listen_addr = %self.connection_cfg.listen_addr,
            service_addr = %self.connection_cfg.service_addr,
            "Ringway node connected."
        );

        Ok(RingwayNode {
            locator: MemberRing::new(ring.clone(), ring_members),
            node,
            ring,
            membership_changes,
            watcher,
        })
    }
}

#[derive(Debug, Clone)]
/// Configuration for the cluster network.
pub struct ConnectionConfig {
    /// The binding address for the gossip socket to bind and listen on.
    ///
    /// This is often `0.0.0.0` + your chosen port.
    pub listen_addr: SocketAddr,

    /// The gossip address to be broadcast to other cluster members.
    ///
    /// This is normally the machine's public IP address and the port gossip is listening on.
    pub public_addr: SocketAddr,

    /// The address of the node's message service, broadcast so peers can reach it.
    pub service_addr: SocketAddr,

    /// A set of initial seed nodes which the node will attempt to connect to and learn of any
    /// other members in the cluster.
    ///
    /// Normal `2` or `3` seeds is fine when running a multi-node cluster.
    /// Having only `1` seed can be dangerous if both nodes happen to go down but the seed
    /// does not restart before this node, as it will be unable to re-join the cluster.
    pub seed_nodes: Vec<String>,
}

impl ConnectionConfig {
    /// Creates a new connection config.
    pub fn new(
        listen_addr: SocketAddr,
        public_addr: SocketAddr,
        service_addr: SocketAddr,
        seeds: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            listen_addr,
            public_addr,
            service_addr,
            seed_nodes: seeds
                .into_iter()
                .map(|seed| seed.as_ref().to_string())
                .collect(),
        }
    }
}

pub struct RingwayNode {
    node: ChitchatNode,
    ring: Arc<Ring>,
    locator: MemberRing,
    membership_changes: watch::Receiver<MembershipChange>,
    watcher: JoinHandle<()>,
}

impl RingwayNode {
    /// Leaves the cluster and stops tracking membership.
    pub async fn shutdown(self) {
        self.node.shutdown().await;
        self.watcher.abort();
    }

    #[inline]
    /// Gets the live cluster statistics.
    pub fn statistics(&self) -> ClusterStatistics {
        self.node.statistics()
    }

    #[inline]
    /// Return the cluster member of the node itself.
    pub fn me(&self) -> &ClusterMember {
        self.node.me.as_ref()
    }

    #[inline]
    /// The ring of members currently owning keys.
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    #[inline]
    /// A locator resolving keys to live ring members.
    pub fn locator(&self) -> MemberRing {
        self.locator.clone()
    }

    #[inline]
    /// Get a stream of membership changes.
    ///
    /// The stream starts with the most recent change, snapshots which neither
    /// add nor remove a node are not reported.
    pub fn membership_changes(&self) -> WatchStream<MembershipChange> {
        WatchStream::new(self.membership_changes.clone())
    }

    /// Waits until every given node is known to the node and applied to its ring.
    pub async fn wait_for_nodes(
        &self,
        node_ids: &[&str],
        timeout: Duration,
    ) -> Result<(), anyhow::Error> {
        let mut members = self.locator.members_watcher();
        tokio::time::timeout(
            timeout,
            members.wait_for(|members| {
                node_ids.iter().all(|id| members.contains_key(*id))
            }),
        )
        .await??;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MembershipChange {
    pub joined: Vec<ClusterMember>,
    pub left: Vec<ClusterMember>,
}

/// Watches for changes in the cluster membership.
///
/// Nodes which have left are removed from the ring before new nodes are added,
/// the applied membership is only published once the ring reflects it.
async fn watch_membership_changes(
    self_node_id: NodeId,
    ring: Arc<Ring>,
    statistics: ClusterStatistics,
    mut last_members: NodeMembership,
    mut changes: WatchStream<NodeMembership>,
    ring_members_tx: watch::Sender<NodeMembership>,
    membership_changes_tx: watch::Sender<MembershipChange>,
) {
    while let Some(members) = changes.next().await {
        let mut membership_changes = MembershipChange::default();
        // A node keeps the role it joined the ring with for as long as it is a member.
        let mut applied = members.clone();

        for (node_id, member) in last_members.iter() {
            if members.contains_key(node_id) {
                continue;
            }

            info!(
                self_node_id = %self_node_id,
                target_node_id = %node_id,
                target_addr = %member.public_addr,
                "Node is no longer part of cluster."
            );
            ring.notify_leave(member);
            membership_changes.left.push(member.clone());
        }

        for (node_id, member) in members.iter() {
            match last_members.get(node_id) {
                None => {
                    info!(
                        self_node_id = %self_node_id,
                        target_node_id = %node_id,
                        target_addr = %member.public_addr,
                        role = %member.role,
                        "Node has connected to the cluster."
                    );
                    ring.notify_join(member);
                    membership_changes.joined.push(member.clone());
                },
                Some(previous) if previous != member => {
                    ring.notify_update(member);
                    if let Some(applied_member) = applied.get_mut(node_id) {
                        applied_member.role = previous.role;
                    }
                },
                Some(_) => {},
            }
        }

        if membership_changes.joined.is_empty() && membership_changes.left.is_empty() {
            debug!(self_node_id = %self_node_id, "Membership snapshot unchanged.");
        } else {
            info!(
                self_node_id = %self_node_id,
                num_members = members.len(),
                num_ring_members = ring.len(),
                "Cluster membership has changed."
            );
            let _ = membership_changes_tx.send(membership_changes);
        }

        statistics
            .num_ring_members
            .store(ring.len() as u64, Ordering::Relaxed);

        let _ = ring_members_tx.send(members);
        last_members = applied;
    }
}

/// Builds a member map from a set of members.
pub fn membership_from_iter(members: impl IntoIterator<Item = ClusterMember>) -> NodeMembership {
    members
        .into_iter()
        .map(|member| (member.node_id.clone(), member))
        .collect::<BTreeMap<_, _>>()
}
