//! DNS wire format codec (RFC 1035 §4).
//!
//! `decode` accepts both compressed and uncompressed names; `encode` always
//! emits uncompressed names. Compression pointers are only followed
//! backwards, so pointer loops and forward references are rejected outright.
//! TCP length framing is applied by the transports, not here.

mod decoder;
mod encoder;
mod name;

pub use decoder::decode;
pub use encoder::{encode, encode_for_udp};

/// Recovers the transaction id from a buffer that failed to decode, when at
/// least the first two header bytes are present. Used to answer FORMERR.
pub fn salvage_id(buf: &[u8]) -> Option<u16> {
    if buf.len() >= 2 {
        Some(u16::from_be_bytes([buf[0], buf[1]]))
    } else {
        None
    }
}
