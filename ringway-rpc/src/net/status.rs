use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

use rkyv::{Archive, Deserialize, Serialize};

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, PartialEq, Eq, Clone)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(PartialEq, Eq, Debug))]
/// Status information around the cause of a call failing.
///
/// This includes a generic status code and message.
pub struct Status {
    /// The generic error code of the call.
    pub code: ErrorCode,
    /// The display message for the error.
    pub message: String,
}

impl Status {
    /// An internal error occurred while the remote peer processed the message.
    pub fn internal(msg: impl Display) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: msg.to_string(),
        }
    }

    /// The received frame is invalid or unable to be deserialized.
    pub fn invalid() -> Self {
        Self {
            code: ErrorCode::InvalidPayload,
            message: "Invalid message payload was provided to be deserialized."
                .to_string(),
        }
    }

    /// The connection could not be established or was interrupted during the operation.
    pub fn connection(msg: impl Display) -> Self {
        Self {
            code: ErrorCode::ConnectionError,
            message: msg.to_string(),
        }
    }

    /// The message is larger than a single frame may carry.
    pub fn too_large(len: usize) -> Self {
        Self {
            code: ErrorCode::InvalidPayload,
            message: format!(
                "Message of {len} bytes exceeds the maximum frame size of {} bytes.",
                super::utils::MAX_FRAME_SIZE,
            ),
        }
    }

    /// The connection was closed before a reply was received.
    pub fn closed() -> Self {
        Self {
            code: ErrorCode::Closed,
            message: "The connection was closed before a reply was received."
                .to_string(),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Debug for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Status")
            .field("code", &self.code)
            .field("message", &self.message)
            .finish()
    }
}

impl Error for Status {}

#[repr(C)]
#[derive(Serialize, Deserialize, Archive, PartialEq, Eq, Debug, Copy, Clone)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug, PartialEq, Eq))]
/// A generic error code describing the high level reason why the call failed.
pub enum ErrorCode {
    /// An internal error occurred while the remote peer processed the message.
    InternalError,
    /// The received frame is invalid or unable to be deserialized.
    InvalidPayload,
    /// The connection could not be established or was interrupted.
    ConnectionError,
    /// The connection was closed before a reply was received.
    Closed,
}
