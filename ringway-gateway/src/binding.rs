use ringway_rpc::{Message, Request};

use crate::classify::{read_binding, CLIENT_ADDR_QUERY, ORIGINAL_ADDR_QUERY, UPSTREAM_KEY_OPTION};
use crate::error::GatewayError;

/// Tags a message a backend pushes back in reply to a forwarded request,
/// so the gateway can relay it to the client the request came from.
///
/// The binding is taken from the request the gateway forwarded. Requests
/// which did not pass through a gateway carry no binding and are rejected.
pub fn bind_push(request: &Request, mut push: Message) -> Result<Message, GatewayError> {
    let binding = read_binding(request.message())?
        .ok_or_else(|| GatewayError::Decode("request carries no client binding".to_string()))?;

    attach_binding(&mut push, &binding);
    Ok(push)
}

/// Replaces any binding on the message with the given one.
pub(crate) fn attach_binding(msg: &mut Message, binding: &str) {
    msg.remove_query(CLIENT_ADDR_QUERY);
    msg.remove_query(ORIGINAL_ADDR_QUERY);
    msg.add_query(format!("{CLIENT_ADDR_QUERY}={binding}"));
    msg.set_option(UPSTREAM_KEY_OPTION, binding.as_bytes());
}
