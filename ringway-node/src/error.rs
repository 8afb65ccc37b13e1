use std::fmt::Debug;
use std::io;

use thiserror::Error;

use crate::NodeId;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    /// An error has occurred within Chitchat.
    ChitChat(String),

    #[error("{0}")]
    /// An IO error has occurred,
    IO(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// The ring was unable to resolve the node owning a key.
pub enum RingError {
    #[error("ring is empty")]
    /// There are no ring members to route to.
    EmptyRing,

    #[error("no node is found for ring entry {0:?}")]
    /// The ring resolved a node which is not part of the live membership.
    ///
    /// This happens when the ring and the membership are observed in the
    /// middle of being updated.
    NoNodeFound(NodeId),
}
