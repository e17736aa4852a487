//! # Radio Packet Decoder
//!
//! Parses on-air frames back into packets. Payload content is never inspected
//! here; interpreting it is the session's job.

use super::protocol::*;
use thiserror::Error;

/// Frame decoding failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the fixed header
    #[error("Frame too short: {len} bytes, need at least 4")]
    TooShort { len: usize },
}

/// Decode a complete radio frame
///
/// # Arguments
///
/// * `frame` - Frame bytes as delivered by the transport
///
/// # Returns
///
/// * `Result<Packet, DecodeError>` - Decoded packet, or `TooShort`
///
/// # Examples
///
/// ```
/// use irradiance_node::link::decoder::{decode, DecodeError};
///
/// let packet = decode(&[22, 30, 1, 0, b'o', b'k']).unwrap();
/// assert_eq!(packet.to, 22);
/// assert_eq!(packet.payload, b"ok");
///
/// assert_eq!(decode(&[22, 30]), Err(DecodeError::TooShort { len: 2 }));
/// ```
pub fn decode(frame: &[u8]) -> Result<Packet, DecodeError> {
    if frame.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { len: frame.len() });
    }

    Ok(Packet {
        to: frame[0],
        from: frame[1],
        id: frame[2],
        flags: frame[3],
        payload: frame[HEADER_LEN..].to_vec(),
    })
}
