use ringway_node::RingError;
use ringway_rpc::Status;
use thiserror::Error;

#[derive(Debug, Error)]
/// An error preventing the gateway from relaying a message.
///
/// None of these are fatal, each one is turned into an abort response
/// sent to whoever sent the message being handled.
pub enum GatewayError {
    #[error("{0}")]
    /// The ring could not resolve an owner for the routing key.
    Ring(#[from] RingError),

    #[error("client not known: {0}")]
    /// A push-back referenced a client which has not been registered.
    ClientNotKnown(String),

    #[error("transport error: {0}")]
    /// Dialing or calling the downstream peer failed.
    Transport(#[from] Status),

    #[error("unable to decode message: {0}")]
    /// The routing metadata of the message is malformed.
    Decode(String),

    #[error("connection pool used before a connector was bound")]
    NotConfigured,

    #[error("connection pool connector has already been bound")]
    AlreadyConfigured,
}
