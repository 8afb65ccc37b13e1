//! # Ringway
//! A gateway routing messages across a gossip-maintained cluster of backend nodes,
//! with support for backends pushing messages back to the original client.
//!
//! This is a convenience package which includes all of the sub-projects within
//! Ringway:
//!
//! ### Features
//! - `ringway_rpc` - A symmetric message transport where either peer may issue requests.
//! - `ringway_node` - Gossip membership and the hash ring mapping keys onto nodes.
//! - `ringway_gateway` - The redirector relaying requests and push-backs.

#[cfg(feature = "ringway-gateway")]
pub use ringway_gateway as gateway;
#[cfg(feature = "ringway-node")]
pub use ringway_node as node;
#[cfg(feature = "ringway-rpc")]
pub use ringway_rpc as rpc;
