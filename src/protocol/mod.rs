//! Protocol module - frame header, framing, and envelopes.
//!
//! - 11-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - `Request` / `Response` envelopes with the tagged `Content` union

mod envelope;
mod frame;
mod frame_buffer;
mod wire_format;

pub use envelope::{
    Content, Request, Response, Tensor, CODE_FAILURE, CODE_SUCCESS, MSG_SUCCESS,
};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, PREDICT_METHOD_ID, RESERVED_METHOD_ID,
};
