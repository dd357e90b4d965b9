//! Incremental frame extraction from a byte stream.
//!
//! Socket reads arrive in arbitrary chunks. [`FrameBuffer`] accumulates them
//! in a `BytesMut` and yields every frame that is complete, keeping the
//! remainder for the next push. Parsing is a two-state machine: waiting for
//! a header, then waiting for that header's payload.

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
enum State {
    Header,
    Payload(Header),
}

/// Accumulates incoming bytes and extracts complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Buffer with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::Header,
            max_payload_size,
        }
    }

    /// Append `data` and return all frames it completes.
    ///
    /// # Errors
    ///
    /// Fails when a header is invalid (see [`Header::validate`]). The stream
    /// cannot be resynchronized after that, so the connection must be dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::Header => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_payload_size)?;
                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::Payload(header);
                }
                State::Payload(header) => {
                    let len = header.payload_length as usize;
                    if self.buffer.len() < len {
                        return Ok(None);
                    }
                    let payload = self.buffer.split_to(len).freeze();
                    self.state = State::Header;
                    return Ok(Some(Frame::new(header, payload)));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn awaiting_payload(&self) -> bool {
        matches!(self.state, State::Payload(_))
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
