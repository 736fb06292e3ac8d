//! Encoding and decoding of the UDP ping datagrams.
//!
//! Every datagram starts with a 4 byte ASCII tag followed by a big-endian
//! `u32` sequence number. Requests carry the raw session token after that.

const TAG_LEN: usize = 4;
const HEADER_LEN: usize = TAG_LEN + 4;

const TAG_REQUEST: [u8; TAG_LEN] = *b"RP01";
const TAG_REPLY: [u8; TAG_LEN] = *b"RR01";
const TAG_ERROR: [u8; TAG_LEN] = *b"RE01";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacketTag {
    /// `RP01`
    Request,
    /// `RR01`
    Reply,
    /// `RE01`, the server no longer accepts the session token.
    Error,
    Unknown([u8; TAG_LEN]),
}

impl PacketTag {
    fn from_bytes(bytes: [u8; TAG_LEN]) -> Self {
        match bytes {
            TAG_REQUEST => PacketTag::Request,
            TAG_REPLY => PacketTag::Reply,
            TAG_ERROR => PacketTag::Error,
            other => PacketTag::Unknown(other),
        }
    }

    fn to_bytes(self) -> [u8; TAG_LEN] {
        match self {
            PacketTag::Request => TAG_REQUEST,
            PacketTag::Reply => TAG_REPLY,
            PacketTag::Error => TAG_ERROR,
            PacketTag::Unknown(bytes) => bytes,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PingResponse {
    pub tag: PacketTag,
    pub sequence: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PingRequest {
    pub sequence: u32,
    pub token: Vec<u8>,
}

#[must_use]
pub fn encode_request(sequence: u32, token: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_LEN + token.len());
    datagram.extend_from_slice(&TAG_REQUEST);
    datagram.extend_from_slice(&sequence.to_be_bytes());
    datagram.extend_from_slice(token);
    datagram
}

/// Decodes the header of a server datagram.
///
/// Returns `None` for datagrams shorter than the 8 byte header. Anything after
/// the header is ignored.
#[must_use]
pub fn decode_response(datagram: &[u8]) -> Option<PingResponse> {
    let (tag, sequence) = split_header(datagram)?;
    Some(PingResponse { tag: PacketTag::from_bytes(tag), sequence })
}

/// Builds a server datagram. Used by echo servers and tests.
#[must_use]
pub fn encode_response(tag: PacketTag, sequence: u32) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_LEN);
    datagram.extend_from_slice(&tag.to_bytes());
    datagram.extend_from_slice(&sequence.to_be_bytes());
    datagram
}

/// Decodes a client request, `None` unless the tag is `RP01`.
#[must_use]
pub fn decode_request(datagram: &[u8]) -> Option<PingRequest> {
    let (tag, sequence) = split_header(datagram)?;
    if tag != TAG_REQUEST {
        return None;
    }
    Some(PingRequest { sequence, token: datagram[HEADER_LEN..].to_vec() })
}

fn split_header(datagram: &[u8]) -> Option<([u8; TAG_LEN], u32)> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    let tag: [u8; TAG_LEN] = datagram[..TAG_LEN].try_into().ok()?;
    let sequence_bytes: [u8; 4] = datagram[TAG_LEN..HEADER_LEN].try_into().ok()?;
    Some((tag, u32::from_be_bytes(sequence_bytes)))
}
