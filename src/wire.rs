//! Binary wire codec for the Wayland protocol.
//!
//! Every message is an 8-byte header followed by 32-bit aligned arguments:
//!
//! ```text
//! ┌─────────────┬─────────────┬──────────────────────┐
//! │  object_id  │ size|opcode │  arguments (padded)  │
//! │  (4 bytes)  │ (4 bytes)   │  (size - 8 bytes)    │
//! └─────────────┴─────────────┴──────────────────────┘
//! ```
//!
//! All integers are little-endian. Strings are a 4-byte length (including the
//! NUL terminator), the bytes, the terminator, then zero padding to a 4-byte
//! boundary.

use crate::error::WireError;

// =============================================================================
// Constants and Limits
// =============================================================================

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 8;

/// Maximum message size accepted or produced.
pub const MAX_MESSAGE_SIZE: usize = 4096;

#[inline]
fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

// =============================================================================
// Primitives
// =============================================================================

/// Encode a `uint`/`object`/`new_id` argument.
#[inline]
pub fn encode_u32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Decode a 32-bit argument, returning it with the remaining bytes.
pub fn decode_u32(buf: &[u8]) -> Result<(u32, &[u8]), WireError> {
    let Some((head, rest)) = buf.split_first_chunk::<4>() else {
        return Err(WireError::Truncated {
            needed: 4,
            available: buf.len(),
        });
    };
    Ok((u32::from_le_bytes(*head), rest))
}

/// Encode a string argument.
///
/// The caller is responsible for `s` having no interior NUL; [`build_request`]
/// checks this before encoding.
pub fn encode_string(s: &str) -> Vec<u8> {
    let len = s.len() + 1;
    let mut out = Vec::with_capacity(4 + padded_len(len));
    out.extend_from_slice(&encode_u32(len as u32));
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out.resize(4 + padded_len(len), 0);
    out
}

/// Decode a string argument, returning it with the remaining bytes.
///
/// A zero length is the protocol's null string and decodes as empty.
pub fn decode_string(buf: &[u8]) -> Result<(String, &[u8]), WireError> {
    let (len, rest) = decode_u32(buf)?;
    let len = len as usize;
    if len == 0 {
        return Ok((String::new(), rest));
    }

    let padded = padded_len(len);
    if rest.len() < padded {
        return Err(WireError::Truncated {
            needed: padded,
            available: rest.len(),
        });
    }

    if rest[len - 1] != 0 {
        return Err(WireError::MissingTerminator);
    }
    let s = std::str::from_utf8(&rest[..len - 1]).map_err(|_| WireError::InvalidUtf8)?;
    Ok((s.to_owned(), &rest[padded..]))
}

// =============================================================================
// Argument Reader
// =============================================================================

/// Cursor over an event payload that checks remaining length before every read.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let (v, rest) = decode_u32(self.buf)?;
        self.buf = rest;
        Ok(v)
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let (s, rest) = decode_string(self.buf)?;
        self.buf = rest;
        Ok(s)
    }

    /// Bytes not yet consumed.
    #[cfg(test)]
    pub(crate) fn remaining(&self) -> &'a [u8] {
        self.buf
    }
}

// =============================================================================
// Message Header
// =============================================================================

/// Parsed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub object_id: u32,
    pub opcode: u16,
    /// Total message size, header included.
    pub size: usize,
}

impl MessageHeader {
    /// Parse the header at the start of `data`.
    ///
    /// Returns `Ok(None)` while fewer than [`HEADER_SIZE`] bytes are buffered,
    /// and an error if the declared size can never be a valid message.
    pub fn parse(data: &[u8]) -> Result<Option<Self>, WireError> {
        let Some(header) = data.first_chunk::<HEADER_SIZE>() else {
            return Ok(None);
        };

        let object_id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let size_opcode = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let size = (size_opcode >> 16) as usize;
        let opcode = (size_opcode & 0xFFFF) as u16;

        if !(HEADER_SIZE..=MAX_MESSAGE_SIZE).contains(&size) {
            log::warn!(
                "[WIRE] Invalid message size {} (object={}, opcode={})",
                size,
                object_id,
                opcode
            );
            return Err(WireError::InvalidSize(size));
        }

        Ok(Some(Self {
            object_id,
            opcode,
            size,
        }))
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&encode_u32(self.object_id));
        out[4..].copy_from_slice(&encode_u32(((self.size as u32) << 16) | u32::from(self.opcode)));
        out
    }
}

// =============================================================================
// Request Builder
// =============================================================================

/// A typed request argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    Uint(u32),
    NewId(u32),
    Object(u32),
    Str(&'a str),
}

/// Build a complete frame: header plus encoded arguments.
pub fn build_request(object_id: u32, opcode: u16, args: &[Arg<'_>]) -> Result<Vec<u8>, WireError> {
    let mut body = Vec::new();
    for arg in args {
        match *arg {
            Arg::Uint(v) | Arg::NewId(v) | Arg::Object(v) => body.extend_from_slice(&encode_u32(v)),
            Arg::Str(s) => {
                if s.contains('\0') {
                    return Err(WireError::InteriorNul);
                }
                body.extend_from_slice(&encode_string(s));
            }
        }
    }

    let size = HEADER_SIZE + body.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(WireError::TooLarge(size));
    }

    let header = MessageHeader {
        object_id,
        opcode,
        size,
    };
    let mut msg = Vec::with_capacity(size);
    msg.extend_from_slice(&header.encode());
    msg.extend_from_slice(&body);

    log::trace!(
        "[WIRE] Built request: object={}, opcode={}, {} bytes",
        object_id,
        opcode,
        size
    );

    Ok(msg)
}

// =============================================================================
// Tests
// =============================================================================
