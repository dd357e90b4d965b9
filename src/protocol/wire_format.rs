//! Frame header encoding and decoding.
//!
//! Every frame starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Method ID│ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! The payload that follows is a MsgPack-encoded envelope.

use crate::error::{Result, ServeError};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 11;

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Reserved method ID, never valid on the wire.
pub const RESERVED_METHOD_ID: u16 = 0;

/// The unary `Predict` method: request envelope in, response envelope out.
pub const PREDICT_METHOD_ID: u16 = 1;

/// Flag bits.
pub mod flags {
    /// Request frame (no bits set).
    pub const REQUEST: u8 = 0;
    /// Frame carries a response envelope.
    pub const IS_RESPONSE: u8 = 0b0000_0010;
    /// Bits that must be zero.
    pub const RESERVED_MASK: u8 = !IS_RESPONSE;

    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub method_id: u16,
    pub flags: u8,
    /// Correlates a response with its request on a pipelined connection.
    pub request_id: u32,
    pub payload_length: u32,
}

impl Header {
    pub fn new(method_id: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            method_id,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Header for a `Predict` request.
    pub fn request(request_id: u32, payload_length: u32) -> Self {
        Self::new(PREDICT_METHOD_ID, flags::REQUEST, request_id, payload_length)
    }

    /// Header answering a request on `method_id`.
    pub fn response(method_id: u16, request_id: u32, payload_length: u32) -> Self {
        Self::new(method_id, flags::IS_RESPONSE, request_id, payload_length)
    }

    /// Encode to big endian bytes.
    ///
    /// ```
    /// use predictwire::protocol::Header;
    ///
    /// let bytes = Header::request(7, 100).encode();
    /// assert_eq!(bytes.len(), 11);
    /// assert_eq!(&bytes[3..7], &7u32.to_be_bytes());
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.method_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode from big endian bytes; `None` if fewer than [`HEADER_SIZE`] bytes.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            method_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Reject reserved method IDs, reserved flag bits and oversized payloads.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.method_id == RESERVED_METHOD_ID {
            return Err(ServeError::Protocol("Method ID 0 is reserved".to_string()));
        }
        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(ServeError::Protocol(format!(
                "Reserved flag bits set: {:#010b}",
                self.flags
            )));
        }
        if self.payload_length > max_payload_size {
            return Err(ServeError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }
}
