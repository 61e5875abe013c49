//! Canonical byte encodings shared by the transaction and block formats.
//!
//! These are normative: every implementation must agree on them bit for
//! bit, since they feed both hashing and signing.

use crate::error::CodecError;

/// Encodes a signed integer as a zigzag/LEB128 varint written into an
/// 8-byte little-endian buffer, the rest zero-padded. Values outside what
/// fits in 8 encoded bytes are never produced by this codebase (indices,
/// heights and nonces stay well within range), so this never needs more
/// than the fixed buffer.
#[must_use]
pub fn varint8(value: i64) -> [u8; 8] {
    let mut x = ((value << 1) ^ (value >> 63)) as u64;
    let mut buf = [0u8; 8];
    let mut i = 0;
    while x >= 0x80 && i < buf.len() {
        buf[i] = (x as u8) | 0x80;
        x >>= 7;
        i += 1;
    }
    if i < buf.len() {
        buf[i] = x as u8;
    }
    buf
}

/// Encodes an IEEE-754 double as 8 big-endian bytes.
#[must_use]
pub fn f64_be_bytes(value: f64) -> [u8; 8] {
    value.to_bits().to_be_bytes()
}

/// Decodes a hex string into bytes.
///
/// # Errors
///
/// Returns [`CodecError::BadEncoding`] if `s` is not valid hex.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(s).map_err(|e| CodecError::BadEncoding(e.to_string()))
}
