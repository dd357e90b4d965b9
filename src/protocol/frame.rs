//! A complete frame: header plus payload.

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame. The payload is shared, not copied.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.header.method_id
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }
}

/// Serialize `header` and `payload` into one contiguous buffer.
///
/// ```
/// use predictwire::protocol::{build_frame, Header, HEADER_SIZE};
///
/// let bytes = build_frame(&Header::request(1, 5), b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.freeze()
}
