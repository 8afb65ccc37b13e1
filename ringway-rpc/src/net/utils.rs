use std::mem;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Message, Status, SCRATCH_SPACE};

static HEADER_TERMINATOR: &[u8] = b"\r\n";

pub const KIND_SIZE: usize = 1;
pub const ID_SIZE: usize = mem::size_of::<u64>();
pub const DATA_LEN_SIZE: usize = mem::size_of::<u32>();
pub const CHECKSUM_SIZE: usize = mem::size_of::<u32>();
pub const LEN_SIZE: usize = KIND_SIZE + ID_SIZE + DATA_LEN_SIZE + CHECKSUM_SIZE;
pub const HEADER_SIZE: usize = LEN_SIZE + 2;
pub const MESSAGE_KIND_REQUEST: u8 = 0;
pub const MESSAGE_KIND_RESPONSE: u8 = 1;
pub const MESSAGE_KIND_ERROR: u8 = 2;

/// The largest body a single frame may carry.
pub const MAX_FRAME_SIZE: usize = 16 << 20;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Request,
    Response,
    Error,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub kind: FrameKind,
    pub id: u64,
    pub len: usize,
    pub checksum: u32,
}

/// Parses a frame header.
///
/// Returns `None` if the buffer does not match the header layout.
pub(crate) fn parse_header(buf: &[u8; HEADER_SIZE]) -> Option<FrameHeader> {
    if &buf[LEN_SIZE..] != HEADER_TERMINATOR {
        return None;
    }

    let kind = match buf[0] {
        MESSAGE_KIND_REQUEST => FrameKind::Request,
        MESSAGE_KIND_RESPONSE => FrameKind::Response,
        MESSAGE_KIND_ERROR => FrameKind::Error,
        _ => return None,
    };

    let mut cursor = KIND_SIZE;
    let id = u64::from_le_bytes(buf[cursor..cursor + ID_SIZE].try_into().ok()?);
    cursor += ID_SIZE;
    let len =
        u32::from_le_bytes(buf[cursor..cursor + DATA_LEN_SIZE].try_into().ok()?);
    cursor += DATA_LEN_SIZE;
    let checksum =
        u32::from_le_bytes(buf[cursor..cursor + CHECKSUM_SIZE].try_into().ok()?);

    if len as usize > MAX_FRAME_SIZE {
        return None;
    }

    Some(FrameHeader {
        kind,
        id,
        len: len as usize,
        checksum,
    })
}

fn write_frame(kind: u8, id: u64, body: &[u8]) -> Bytes {
    let mut buffer = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buffer.put_u8(kind);
    buffer.put_u64_le(id);
    buffer.put_u32_le(body.len() as u32);
    buffer.put_u32_le(crc32fast::hash(body));
    buffer.put_slice(HEADER_TERMINATOR);
    buffer.put_slice(body);
    buffer.freeze()
}

/// Serializes a request into a frame.
pub(crate) fn serialize_request(id: u64, msg: &Message) -> Result<Bytes, Status> {
    serialize_message(MESSAGE_KIND_REQUEST, id, msg)
}

/// Serializes a response into a frame.
pub(crate) fn serialize_response(id: u64, msg: &Message) -> Result<Bytes, Status> {
    serialize_message(MESSAGE_KIND_RESPONSE, id, msg)
}

fn serialize_message(kind: u8, id: u64, msg: &Message) -> Result<Bytes, Status> {
    let body =
        rkyv::to_bytes::<_, SCRATCH_SPACE>(msg).map_err(|_| Status::invalid())?;

    // The peer drops the whole connection on a frame it cannot accept.
    if body.len() > MAX_FRAME_SIZE {
        return Err(Status::too_large(body.len()));
    }

    Ok(write_frame(kind, id, &body))
}

/// Serializes a error payload into a frame, if the error serialization fails
/// a frame with an empty body is produced.
pub(crate) fn serialize_error(id: u64, status: &Status) -> Bytes {
    match rkyv::to_bytes::<_, SCRATCH_SPACE>(status) {
        Ok(body) => write_frame(MESSAGE_KIND_ERROR, id, &body),
        Err(error) => {
            warn!(error = ?error, "Failed to serialize error payload, returning default...");
            write_frame(MESSAGE_KIND_ERROR, id, &[])
        },
    }
}

/// Checks the integrity of a frame body against its header.
pub(crate) fn verify_checksum(header: &FrameHeader, body: &[u8]) -> bool {
    crc32fast::hash(body) == header.checksum
}
