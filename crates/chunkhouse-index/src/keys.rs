//! Index key codec.
//!
//! Every index row is addressed by a `(hash, range)` pair:
//!
//! - the **hash key** `"<tenant>:<hourBucket>:<metricName>"` picks the
//!   partition — one shard per tenant per metric per hour;
//! - the **range key** encodes the tuple `(labelName, labelValue,
//!   chunkID)` such that byte-wise comparison of two encodings agrees
//!   with lexicographic comparison of the tuples. That property is what
//!   makes a `BETWEEN` scan on the range key answer a prefix query.
//!
//! ## Encoding
//!
//! Each field is emitted as a `0x02` tag, the field's UTF-8 bytes with
//! every `0x00` escaped as `0x00 0xFF`, and a `0x00` terminator:
//!
//! ```text
//! ("job", "api", "1:0:9")
//!   → 02 'j' 'o' 'b' 00 │ 02 'a' 'p' 'i' 00 │ 02 '1' ':' '0' ':' '9' 00
//! ```
//!
//! The escape keeps embedded NULs ordered correctly (an escaped NUL
//! `00 FF` compares below every other byte but above a terminator), and
//! the tag keeps a terminator unambiguous: a `0x00` followed by `0xFF` is
//! a literal NUL, anything else ends the field.

use bytes::Bytes;

use crate::error::{IndexError, Result};

const FIELD_TAG: u8 = 0x02;
const TERMINATOR: u8 = 0x00;
const NUL_ESCAPE: u8 = 0xFF;

/// Hash key for one tenant/hour/metric shard.
pub fn hash_key(tenant: &str, hour: i64, metric_name: &str) -> String {
    format!("{tenant}:{hour}:{metric_name}")
}

/// Encode `(label, value, chunk_id)` as an order-preserving range key.
pub fn encode_range(label: &str, value: &str, chunk_id: &str) -> Bytes {
    let mut buf = Vec::with_capacity(label.len() + value.len() + chunk_id.len() + 6);
    for field in [label, value, chunk_id] {
        buf.push(FIELD_TAG);
        for &byte in field.as_bytes() {
            buf.push(byte);
            if byte == TERMINATOR {
                buf.push(NUL_ESCAPE);
            }
        }
        buf.push(TERMINATOR);
    }
    Bytes::from(buf)
}

/// Decode a range key back into `(label, value, chunk_id)`.
pub fn decode_range(raw: &[u8]) -> Result<(String, String, String)> {
    let mut fields = Vec::with_capacity(3);
    let mut i = 0;
    while fields.len() < 3 {
        if raw.get(i) != Some(&FIELD_TAG) {
            return Err(IndexError::MalformedRangeKey);
        }
        i += 1;
        let mut field = Vec::new();
        loop {
            match raw.get(i) {
                Some(&TERMINATOR) => {
                    if raw.get(i + 1) == Some(&NUL_ESCAPE) {
                        field.push(TERMINATOR);
                        i += 2;
                    } else {
                        i += 1;
                        break;
                    }
                }
                Some(&byte) => {
                    field.push(byte);
                    i += 1;
                }
                None => return Err(IndexError::MalformedRangeKey),
            }
        }
        fields.push(String::from_utf8(field).map_err(|_| IndexError::MalformedRangeKey)?);
    }
    if i != raw.len() {
        return Err(IndexError::MalformedRangeKey);
    }
    let mut fields = fields.into_iter();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(label), Some(value), Some(chunk_id)) => Ok((label, value, chunk_id)),
        _ => Err(IndexError::MalformedRangeKey),
    }
}

/// The smallest string strictly greater than `s`, used as the open upper
/// bound of a range scan. The empty string maps to `"\u{0}"`.
///
/// TODO: carry into the preceding char when the final char cannot be
/// incremented (`char::MAX`, or just below the surrogate range); the
/// bound is not strictly greater in those cases.
pub fn successor(s: &str) -> String {
    let mut out = s.to_string();
    match out.pop() {
        Some(last) => {
            let bumped = char::from_u32(last as u32 + 1).unwrap_or(last);
            out.push(bumped);
        }
        None => out.push('\u{0}'),
    }
    out
}
