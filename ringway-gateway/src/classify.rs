use ringway_rpc::Message;

use crate::error::GatewayError;

/// The option id carrying the binding of a forwarded message.
pub const UPSTREAM_KEY_OPTION: u16 = 204;
/// The query naming the routing key of a client request.
pub const KEY_QUERY: &str = "key";
/// The query naming the client a push-back is destined for.
pub const CLIENT_ADDR_QUERY: &str = "clientAddr";
/// An alternative name for [CLIENT_ADDR_QUERY] accepted from backends.
pub const ORIGINAL_ADDR_QUERY: &str = "originalAddr";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the gateway should do with an inbound message.
pub enum MessageKind {
    /// A client request to dispatch to the backend owning `key`.
    RouteByKey { key: String },
    /// A backend push to relay to the client identified by `binding`.
    PushToClient { binding: String },
    /// Neither a routing key nor a binding is present.
    Unknown,
}

/// Classifies a message by its routing metadata.
///
/// A routing key takes precedence over any binding.
pub fn classify(msg: &Message) -> Result<MessageKind, GatewayError> {
    match msg.query(KEY_QUERY) {
        Some(Some(key)) => {
            return Ok(MessageKind::RouteByKey {
                key: key.to_string(),
            })
        },
        Some(None) => {
            return Err(GatewayError::Decode(format!(
                "`{KEY_QUERY}` query has no value"
            )))
        },
        None => {},
    }

    match read_binding(msg)? {
        Some(binding) => Ok(MessageKind::PushToClient { binding }),
        None => Ok(MessageKind::Unknown),
    }
}

pub(crate) fn read_binding(msg: &Message) -> Result<Option<String>, GatewayError> {
    if let Some(raw) = msg.option(UPSTREAM_KEY_OPTION) {
        let binding = std::str::from_utf8(raw).map_err(|e| {
            GatewayError::Decode(format!("upstream key option is not valid UTF-8: {e}"))
        })?;
        return Ok(Some(binding.to_string()));
    }

    for name in [CLIENT_ADDR_QUERY, ORIGINAL_ADDR_QUERY] {
        match msg.query(name) {
            Some(Some(binding)) => return Ok(Some(binding.to_string())),
            Some(None) => {
                return Err(GatewayError::Decode(format!("`{name}` query has no value")))
            },
            None => {},
        }
    }

    Ok(None)
}
