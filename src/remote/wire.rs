//! Wire envelope format for remote bus forwarding (§6 "Wire protocol for
//! remote transport").
//!
//! Each frame is a 4-byte big-endian length prefix followed by a body of
//! four length-prefixed fields (universe name, channel, type tag) plus an
//! 8-byte sequence number and the raw payload bytes. Control messages
//! (`Subscribe`, `Unsubscribe`, `Heartbeat`, `ProviderGone`) reuse the same
//! frame shape with a reserved type-tag string and an empty payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::TransportError;

const SUBSCRIBE_TAG: &str = "__subscribe__";
const UNSUBSCRIBE_TAG: &str = "__unsubscribe__";
const HEARTBEAT_TAG: &str = "__heartbeat__";
const PROVIDER_GONE_TAG: &str = "__provider_gone__";

/// The class tag of a forwarded payload, or one of the reserved control
/// message tags (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Data(String),
    Subscribe,
    Unsubscribe,
    Heartbeat,
    ProviderGone,
}

impl TypeTag {
    fn as_str(&self) -> &str {
        match self {
            TypeTag::Data(tag) => tag.as_str(),
            TypeTag::Subscribe => SUBSCRIBE_TAG,
            TypeTag::Unsubscribe => UNSUBSCRIBE_TAG,
            TypeTag::Heartbeat => HEARTBEAT_TAG,
            TypeTag::ProviderGone => PROVIDER_GONE_TAG,
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            SUBSCRIBE_TAG => TypeTag::Subscribe,
            UNSUBSCRIBE_TAG => TypeTag::Unsubscribe,
            HEARTBEAT_TAG => TypeTag::Heartbeat,
            PROVIDER_GONE_TAG => TypeTag::ProviderGone,
            other => TypeTag::Data(other.to_string()),
        }
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, TypeTag::Data(_))
    }
}

/// One forwarded bus publication or control message (§3 "BusConnector",
/// §6 "Wire protocol").
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source_universe: String,
    pub channel: String,
    pub type_tag: TypeTag,
    pub sequence: u64,
    pub payload: Vec<u8>,
}

fn put_field(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_field(buf: &mut impl Buf) -> Result<String, TransportError> {
    if buf.remaining() < 4 {
        return Err(TransportError::Malformed("truncated field length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(TransportError::Malformed("truncated field body".into()));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| TransportError::Malformed("field is not valid utf-8".into()))
}

/// Serializes the body of a frame (everything after the 4-byte length
/// prefix, which [`crate::remote::transport`] writes separately).
pub fn encode_body(envelope: &Envelope) -> BytesMut {
    let mut buf = BytesMut::new();
    put_field(&mut buf, &envelope.source_universe);
    put_field(&mut buf, &envelope.channel);
    put_field(&mut buf, envelope.type_tag.as_str());
    buf.put_u64(envelope.sequence);
    buf.put_slice(&envelope.payload);
    buf
}

pub fn decode_body(mut body: &[u8]) -> Result<Envelope, TransportError> {
    let source_universe = get_field(&mut body)?;
    let channel = get_field(&mut body)?;
    let type_tag = TypeTag::parse(&get_field(&mut body)?);
    if body.remaining() < 8 {
        return Err(TransportError::Malformed("truncated sequence number".into()));
    }
    let sequence = body.get_u64();
    let payload = body.to_vec();
    Ok(Envelope {
        source_universe,
        channel,
        type_tag,
        sequence,
        payload,
    })
}

pub fn heartbeat(source_universe: impl Into<String>, sequence: u64) -> Envelope {
    Envelope {
        source_universe: source_universe.into(),
        channel: String::new(),
        type_tag: TypeTag::Heartbeat,
        sequence,
        payload: Vec::new(),
    }
}
