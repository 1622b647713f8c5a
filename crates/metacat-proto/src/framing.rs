//! Length-prefix framing for messages on the wire.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.

use crate::Error;

/// Largest payload accepted in a single frame (16 MB).
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Size of the length header.
pub const HEADER_LEN: usize = 4;

/// Wrap a payload in a frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(Error::InvalidMessage(format!(
            "payload of {} bytes exceeds frame limit {}",
            payload.len(),
            MAX_FRAME_PAYLOAD
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Borrow the payload of a complete frame.
///
/// Trailing bytes after the declared payload are ignored.
pub fn extract_payload(frame: &[u8]) -> Result<&[u8], Error> {
    let header: [u8; HEADER_LEN] = frame
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| Error::InvalidMessage(format!("frame shorter than {HEADER_LEN}-byte header")))?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_PAYLOAD {
        return Err(Error::InvalidMessage(format!(
            "declared payload of {} bytes exceeds frame limit {}",
            len, MAX_FRAME_PAYLOAD
        )));
    }

    frame
        .get(HEADER_LEN..HEADER_LEN + len)
        .ok_or_else(|| {
            Error::InvalidMessage(format!(
                "truncated frame: have {} bytes, need {}",
                frame.len(),
                HEADER_LEN + len
            ))
        })
}
