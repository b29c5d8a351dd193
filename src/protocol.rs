//! Wire framing: `<control:1><payload_len:u32 BE><payload>` requests,
//! `<response:1><body>` responses. Implemented as a `tokio_util::codec`
//! pair so the connection handler can drive it with `Framed`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::record::Value;

pub const PARSE: u8 = b'P';
pub const EXECUTE: u8 = b'E';
pub const QUERY: u8 = b'Q';
pub const NEXT: u8 = b'N';
pub const DESCRIBE: u8 = b'D';
pub const BIND: u8 = b'B';

const HEADER_LEN: usize = 5;

/// One request frame, still opaque — the connection handler parses
/// `payload` according to `control`.
#[derive(Debug, Clone)]
pub struct Command {
    pub control: u8,
    pub payload: Bytes,
}

/// A response frame ready to write back to the client.
#[derive(Debug, Clone)]
pub enum Response {
    Error(String),
    Completed,
    RowDescription(Vec<String>),
    RowData(Vec<String>),
}

pub struct Codec {
    max_recv_size: u32,
}

impl Codec {
    pub fn new(max_recv_size: u32) -> Self {
        Self { max_recv_size }
    }
}

impl Decoder for Codec {
    type Item = Command;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let control = src[0];
        let payload_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if payload_len > self.max_recv_size {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload_len,
                max: self.max_recv_size,
            });
        }
        if src.len() < HEADER_LEN + payload_len as usize {
            src.reserve(HEADER_LEN + payload_len as usize - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_len as usize).freeze();
        Ok(Some(Command { control, payload }))
    }
}

impl Encoder<Response> for Codec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match item {
            Response::Error(msg) => {
                dst.put_u8(b'E');
                put_string(dst, &msg);
            }
            Response::Completed => {
                dst.put_u8(b'C');
            }
            Response::RowDescription(cols) => {
                dst.put_u8(b'B');
                put_strings(dst, &cols);
            }
            Response::RowData(values) => {
                dst.put_u8(b'D');
                put_strings(dst, &values);
            }
        }
        Ok(())
    }
}

fn put_string(dst: &mut BytesMut, s: &str) {
    dst.put_u32(s.len() as u32);
    dst.put_slice(s.as_bytes());
}

fn put_strings(dst: &mut BytesMut, items: &[String]) {
    dst.put_u32(items.len() as u32);
    for s in items {
        put_string(dst, s);
    }
}

/// Reads a length-prefixed UTF-8 string from the front of `payload`,
/// consuming it.
pub fn read_string(payload: &mut Bytes) -> Result<String, ProtocolError> {
    let bytes = read_bytes(payload)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::Io(e.to_string()))
}

/// Reads a length-prefixed opaque byte field from the front of `payload`,
/// consuming it. Used for prepared-statement names, which the protocol
/// treats as opaque client-chosen bytes.
pub fn read_bytes(payload: &mut Bytes) -> Result<Bytes, ProtocolError> {
    if payload.len() < 4 {
        return Err(ProtocolError::Io("truncated length prefix".into()));
    }
    let len = payload.get_u32() as usize;
    if payload.len() < len {
        return Err(ProtocolError::Io("truncated field body".into()));
    }
    Ok(payload.split_to(len))
}

/// Renders a native value as the wire's string form (the client decodes
/// its own types; we send the plain textual representation).
pub fn value_to_wire_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(i) => i.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => hex::encode(b),
        Value::Bool(b) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_returns_none_until_full_frame_buffered() {
        let mut codec = Codec::new(1024);
        let mut buf = BytesMut::from(&[b'N', 0, 0, 0, 3][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"abc");
        let cmd = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.control, b'N');
        assert_eq!(&cmd.payload[..], b"abc");
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut codec = Codec::new(4);
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 0, 5][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
    }

    #[test]
    fn payload_length_exactly_at_max_is_accepted() {
        let mut codec = Codec::new(3);
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 0, 3][..]);
        buf.extend_from_slice(b"abc");
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn string_round_trips() {
        let mut dst = BytesMut::new();
        put_string(&mut dst, "hello");
        let mut bytes = dst.freeze();
        assert_eq!(read_string(&mut bytes).unwrap(), "hello");
    }

    #[test]
    fn response_encoding_tags_match_the_wire_contract() {
        let mut codec = Codec::new(1024);
        let mut dst = BytesMut::new();
        codec.encode(Response::Completed, &mut dst).unwrap();
        assert_eq!(dst[0], b'C');

        let mut dst = BytesMut::new();
        codec
            .encode(Response::RowDescription(vec!["a".into()]), &mut dst)
            .unwrap();
        assert_eq!(dst[0], b'B');
    }
}
