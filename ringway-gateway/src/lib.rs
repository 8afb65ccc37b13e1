//! A gateway relaying messages in both directions between clients and the
//! backend nodes of a ringway cluster.
//!
//! Clients address requests by routing key, the gateway forwards each one to
//! the ring member owning the key. Backends can push follow-up messages back
//! to the client through the gateway at any later point.

mod binding;
mod classify;
mod error;
mod pool;
mod redirector;

pub use binding::bind_push;
pub use classify::{
    classify,
    MessageKind,
    CLIENT_ADDR_QUERY,
    KEY_QUERY,
    ORIGINAL_ADDR_QUERY,
    UPSTREAM_KEY_OPTION,
};
pub use error::GatewayError;
pub use pool::{ConnectionPool, Connector, EvictClosed, EvictionPolicy, NeverEvict};
pub use redirector::{Redirector, UNKNOWN_REQUEST};
