use std::sync::Arc;

use tokio::sync::watch;

use crate::error::RingError;
use crate::node::NodeMembership;
use crate::ring::Ring;
use crate::ClusterMember;

/// Resolves the cluster member which should handle a given routing key.
pub trait NodeLocator: Send + Sync + 'static {
    /// Gets the member owning the given key.
    fn get_node(&self, key: &[u8]) -> Result<ClusterMember, RingError>;
}

impl<T: NodeLocator> NodeLocator for Arc<T> {
    fn get_node(&self, key: &[u8]) -> Result<ClusterMember, RingError> {
        self.as_ref().get_node(key)
    }
}

#[derive(Clone)]
/// The ring paired with the live view of the cluster membership.
///
/// The ring only knows node IDs, the membership provides the
/// addresses needed to actually reach the node.
pub struct MemberRing {
    ring: Arc<Ring>,
    members: watch::Receiver<NodeMembership>,
}

impl MemberRing {
    pub fn new(ring: Arc<Ring>, members: watch::Receiver<NodeMembership>) -> Self {
        Self { ring, members }
    }

    #[inline]
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// The current snapshot of live members.
    pub fn members(&self) -> NodeMembership {
        self.members.borrow().clone()
    }

    /// Returns a handle to the members watcher channel.
    pub fn members_watcher(&self) -> watch::Receiver<NodeMembership> {
        self.members.clone()
    }
}

impl NodeLocator for MemberRing {
    fn get_node(&self, key: &[u8]) -> Result<ClusterMember, RingError> {
        let node_id = self.ring.get_node_id(key)?;

        self.members
            .borrow()
            .get(&node_id)
            .cloned()
            .ok_or(RingError::NoNodeFound(node_id))
    }
}
