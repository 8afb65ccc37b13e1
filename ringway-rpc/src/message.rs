use std::fmt::{Display, Formatter};

use rkyv::{Archive, Deserialize, Serialize};

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[archive(check_bytes)]
/// The method of a request or the outcome of a response.
pub enum Code {
    Get,
    Post,
    Put,
    Delete,

    Content,
    Changed,
    Created,
    Deleted,
    BadRequest,
    NotFound,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
/// An opaque, numbered piece of message metadata.
pub struct MessageOption {
    pub id: u16,
    pub value: Vec<u8>,
}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, Clone, Debug, PartialEq, Eq)]
#[archive(check_bytes)]
/// A single request or response travelling over a [crate::Connection].
///
/// Requests and responses share the same shape, a response is simply a message
/// whose [Code] is not a request method. Cloning a message preserves its code,
/// path, queries, options and payload verbatim.
pub struct Message {
    /// The request method or response code.
    pub code: Code,
    /// The target path of a request, empty for responses.
    pub path: String,
    /// Query parameters in `name=value` form, in the order they were added.
    pub queries: Vec<String>,
    /// Out-of-band metadata, at most one entry per option id.
    pub options: Vec<MessageOption>,
    /// The raw message body.
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a new empty request.
    pub fn request(code: Code, path: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            queries: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Creates a new response with the given payload.
    pub fn response(code: Code, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            path: String::new(),
            queries: Vec::new(),
            options: Vec::new(),
            payload: payload.into(),
        }
    }

    #[inline]
    pub fn code(&self) -> Code {
        self.code
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Sets the message payload.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Appends a raw query parameter, normally in `name=value` form.
    pub fn add_query(&mut self, query: impl Into<String>) {
        self.queries.push(query.into());
    }

    /// Appends a `name=value` query parameter.
    pub fn with_query(mut self, name: &str, value: impl Display) -> Self {
        self.add_query(format!("{name}={value}"));
        self
    }

    /// The raw query parameters of the message.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Gets the value of the first query parameter with the given name.
    ///
    /// A parameter without any `=` separator has no value and is
    /// returned as `Some(None)`.
    pub fn query(&self, name: &str) -> Option<Option<&str>> {
        self.queries.iter().find_map(|raw| match raw.split_once('=') {
            Some((key, value)) if key == name => Some(Some(value)),
            None if raw == name => Some(None),
            _ => None,
        })
    }

    /// Removes every query parameter with the given name.
    pub fn remove_query(&mut self, name: &str) {
        self.queries.retain(|raw| {
            let key = raw.split_once('=').map(|(key, _)| key).unwrap_or(raw);
            key != name
        });
    }

    /// Sets an option, replacing any existing value with the same id.
    pub fn set_option(&mut self, id: u16, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self.options.iter_mut().find(|opt| opt.id == id) {
            Some(existing) => existing.value = value,
            None => self.options.push(MessageOption { id, value }),
        }
    }

    /// Gets the value of the option with the given id.
    pub fn option(&self, id: u16) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|opt| opt.id == id)
            .map(|opt| opt.value.as_slice())
    }
}
