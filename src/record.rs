//! On-disk row encoding: a SQLite-style serial-type header followed by the
//! typed field bytes it describes.
//!
//! Each page's record stream is a simple length-prefixed sequence of
//! records (a record count followed by `<u32 len><bytes>` repeated); only
//! page 1's first 100 bytes need to match SQLite's own layout; the leaf
//! body format here is this crate's own simplification of SQLite's
//! cell-pointer b-tree, which is out of scope for the pager interface.

use crate::error::RuntimeError;

/// The native value set rows are made of in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
}

// Serial type tags, modeled on SQLite's record format (storage/serialtype.h):
// 0 = NULL, 1 = 8-byte big-endian int, 8/9 = constants 0/1 (used for bool),
// even n>=12 = BLOB of length (n-12)/2, odd n>=13 = TEXT of length (n-13)/2.
const SERIAL_NULL: u64 = 0;
const SERIAL_INT: u64 = 1;
const SERIAL_BOOL_FALSE: u64 = 8;
const SERIAL_BOOL_TRUE: u64 = 9;

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    let mut buf = [0u8; 10];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for j in i..buf.len() - 1 {
        out.push(buf[j] | 0x80);
    }
    out.push(buf[buf.len() - 1]);
}

fn read_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    for (i, &b) in bytes.iter().enumerate().take(9) {
        result = (result << 7) | (b & 0x7f) as u64;
        if b & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

fn serial_type_for(value: &Value) -> (u64, usize) {
    match value {
        Value::Null => (SERIAL_NULL, 0),
        Value::Int(_) => (SERIAL_INT, 8),
        Value::Bool(false) => (SERIAL_BOOL_FALSE, 0),
        Value::Bool(true) => (SERIAL_BOOL_TRUE, 0),
        Value::Text(s) => ((s.len() as u64) * 2 + 13, s.len()),
        Value::Blob(b) => ((b.len() as u64) * 2 + 12, b.len()),
    }
}

/// Encodes a tuple of values into one on-disk record: `<header_len varint>
/// <serial type varint>* <payload bytes>*`.
pub fn encode_record(values: &[Value]) -> Vec<u8> {
    let mut serial_types = Vec::with_capacity(values.len());
    let mut body_len = 0usize;
    for v in values {
        let (st, len) = serial_type_for(v);
        serial_types.push(st);
        body_len += len;
    }

    let mut header = Vec::new();
    for st in &serial_types {
        write_varint(&mut header, *st);
    }

    // header_len counts its own varint width too, which can in turn change
    // that width; fixed-point over the (at most two) widths this format needs.
    let mut header_len_width = 1usize;
    let mut header_len_field = Vec::new();
    loop {
        header_len_field.clear();
        write_varint(&mut header_len_field, (header.len() + header_len_width) as u64);
        if header_len_field.len() == header_len_width {
            break;
        }
        header_len_width = header_len_field.len();
    }

    let mut out = Vec::with_capacity(header_len_field.len() + header.len() + body_len);
    out.extend_from_slice(&header_len_field);
    out.extend_from_slice(&header);
    for v in values {
        match v {
            Value::Null | Value::Bool(_) => {}
            Value::Int(i) => out.extend_from_slice(&i.to_be_bytes()),
            Value::Text(s) => out.extend_from_slice(s.as_bytes()),
            Value::Blob(b) => out.extend_from_slice(b),
        }
    }
    out
}

/// Decodes one record produced by [`encode_record`].
pub fn decode_record(bytes: &[u8]) -> Result<Vec<Value>, RuntimeError> {
    let (header_len, header_len_width) =
        read_varint(bytes).ok_or_else(|| RuntimeError::Page("truncated record header".into()))?;
    let header_end = header_len as usize;
    if header_end > bytes.len() {
        return Err(RuntimeError::Page("record header length out of range".into()));
    }

    let mut serial_types = Vec::new();
    let mut pos = header_len_width;
    while pos < header_end {
        let (st, width) = read_varint(&bytes[pos..])
            .ok_or_else(|| RuntimeError::Page("truncated serial type".into()))?;
        serial_types.push(st);
        pos += width;
    }

    let mut values = Vec::with_capacity(serial_types.len());
    let mut body_pos = header_end;
    for st in serial_types {
        match st {
            SERIAL_NULL => values.push(Value::Null),
            SERIAL_BOOL_FALSE => values.push(Value::Bool(false)),
            SERIAL_BOOL_TRUE => values.push(Value::Bool(true)),
            SERIAL_INT => {
                let end = body_pos + 8;
                let chunk = bytes
                    .get(body_pos..end)
                    .ok_or_else(|| RuntimeError::Page("truncated int field".into()))?;
                values.push(Value::Int(i64::from_be_bytes(chunk.try_into().unwrap())));
                body_pos = end;
            }
            n if n >= 12 && n % 2 == 0 => {
                let len = ((n - 12) / 2) as usize;
                let end = body_pos + len;
                let chunk = bytes
                    .get(body_pos..end)
                    .ok_or_else(|| RuntimeError::Page("truncated blob field".into()))?;
                values.push(Value::Blob(chunk.to_vec()));
                body_pos = end;
            }
            n if n >= 13 && n % 2 == 1 => {
                let len = ((n - 13) / 2) as usize;
                let end = body_pos + len;
                let chunk = bytes
                    .get(body_pos..end)
                    .ok_or_else(|| RuntimeError::Page("truncated text field".into()))?;
                let text = std::str::from_utf8(chunk)
                    .map_err(|e| RuntimeError::Page(e.to_string()))?
                    .to_string();
                values.push(Value::Text(text));
                body_pos = end;
            }
            other => return Err(RuntimeError::Page(format!("unknown serial type {other}"))),
        }
    }
    Ok(values)
}

/// A page's leaf body: a record count followed by length-prefixed records.
pub fn encode_page_records(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for r in records {
        out.extend_from_slice(&(r.len() as u32).to_be_bytes());
        out.extend_from_slice(r);
    }
    out
}

/// Reads back every record appended by [`encode_page_records`], ignoring
/// trailing zero padding from the fixed page size.
pub fn decode_page_records(page: &[u8]) -> Result<Vec<Vec<u8>>, RuntimeError> {
    if page.len() < 4 {
        return Ok(Vec::new());
    }
    let count = u32::from_be_bytes(page[0..4].try_into().unwrap()) as usize;
    let mut out = Vec::with_capacity(count);
    let mut pos = 4;
    for _ in 0..count {
        let len_bytes = page
            .get(pos..pos + 4)
            .ok_or_else(|| RuntimeError::Page("truncated record length".into()))?;
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
        pos += 4;
        let rec = page
            .get(pos..pos + len)
            .ok_or_else(|| RuntimeError::Page("truncated record body".into()))?;
        out.push(rec.to_vec());
        pos += len;
    }
    Ok(out)
}
