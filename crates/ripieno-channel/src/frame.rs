//! Wire framing.
//!
//! Every message crosses the stream as one length-prefixed frame:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  u32 magic  │  u32 size  │ u32 kind │ u32 cookie │
//! ├──────────────────────────────────────────────┤
//! │  payload[size]                               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All header fields are little-endian regardless of host byte order. The
//! payload is an opaque byte sequence whose schema is fixed by `kind`.

use crate::error::{ChannelError, Result};
use crate::messages::Message;

/// Frame sentinel, `"RGUI"` as little-endian bytes.
pub const MAGIC: u32 = 0x4955_4752;

/// Header octets preceding the payload.
pub const HEADER_LEN: usize = 16;

/// Payloads above this size are framing corruption, not data.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Append one complete frame to `out`.
pub fn encode_into(out: &mut Vec<u8>, kind: u32, cookie: u32, payload: &[u8]) {
    out.reserve(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&cookie.to_le_bytes());
    out.extend_from_slice(payload);
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

/// Take the next complete frame off the head of `input`, if one is buffered.
///
/// Returns `Ok(None)` when the buffer holds only a partial frame. Corrupt
/// headers (wrong magic, oversized payload) are unrecoverable: the stream
/// offset is lost, so the caller must close the channel.
pub fn take_frame(input: &mut Vec<u8>) -> Result<Option<Message>> {
    if input.len() < HEADER_LEN {
        return Ok(None);
    }

    let magic = read_u32(input, 0);
    if magic != MAGIC {
        return Err(ChannelError::BadMagic { found: magic });
    }

    let size = read_u32(input, 4);
    if size > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let total = HEADER_LEN + size as usize;
    if input.len() < total {
        return Ok(None);
    }

    let kind = read_u32(input, 8);
    let cookie = read_u32(input, 12);
    let payload = input[HEADER_LEN..total].to_vec();
    input.drain(..total);

    Ok(Some(Message {
        kind,
        cookie,
        payload,
    }))
}
