//! Codec module - content codecs and envelope serialization.
//!
//! - [`Codec`] - converts between a wire [`Content`] variant and a handler [`Value`]
//! - [`MsgPackCodec`] - serializes `Request` / `Response` envelopes into frame payloads
//!
//! # Codec selection
//!
//! A route may pin its input codec. When it does not, the codec is inferred
//! from the populated content variant, falling back to [`Codec::Json`].
//! Output defaults to [`Codec::Text`].
//!
//! # Example
//!
//! ```
//! use predictwire::codec::Codec;
//! use predictwire::protocol::Content;
//! use predictwire::value::Value;
//!
//! let content = Content::Text("hi".to_string());
//! let codec = Codec::infer(&content);
//! assert_eq!(codec, Codec::Text);
//!
//! let value = codec.decode(content).unwrap();
//! assert_eq!(value, Value::Text("hi".to_string()));
//! ```

mod msgpack;
mod tensor;

pub use msgpack::MsgPackCodec;
pub use tensor::{array_to_tensor, tensor_to_array};

use crate::error::DecodeError;
use crate::protocol::Content;
use crate::value::Value;

/// Bidirectional converter between wire content and a handler value.
///
/// Codecs are stateless; one value is shared by every request on a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Wire text ⇄ [`Value::Text`].
    Text,
    /// Wire bytes ⇄ [`Value::Bytes`].
    Bytes,
    /// Wire tensor ⇄ [`Value::Array`].
    NumericArray,
    /// Wire JSON text ⇄ [`Value::Json`].
    Json,
}

impl Codec {
    pub fn name(self) -> &'static str {
        match self {
            Codec::Text => "text",
            Codec::Bytes => "bytes",
            Codec::NumericArray => "tensor",
            Codec::Json => "json",
        }
    }

    /// Pick the codec matching the populated variant; JSON when nothing else applies.
    pub fn infer(content: &Content) -> Codec {
        match content {
            Content::Text(_) => Codec::Text,
            Content::Tensor(_) => Codec::NumericArray,
            Content::Bytes(_) => Codec::Bytes,
            Content::Json(_) | Content::Empty => Codec::Json,
        }
    }

    /// Decode wire content into a value.
    ///
    /// Empty content decodes as JSON `null` under the JSON codec and is a
    /// tag mismatch for every other codec.
    pub fn decode(self, content: Content) -> Result<Value, DecodeError> {
        match (self, content) {
            (Codec::Text, Content::Text(s)) => Ok(Value::Text(s)),
            (Codec::Bytes, Content::Bytes(b)) => Ok(Value::Bytes(b)),
            (Codec::NumericArray, Content::Tensor(t)) => Ok(Value::Array(tensor_to_array(t)?)),
            (Codec::Json, Content::Json(s)) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|e| DecodeError::InvalidJson(e.to_string())),
            (Codec::Json, Content::Empty) => Ok(Value::Json(serde_json::Value::Null)),
            (codec, other) => Err(DecodeError::TagMismatch {
                codec: codec.name(),
                found: other.tag(),
            }),
        }
    }

    /// Encode a value into wire content.
    ///
    /// Text also accepts JSON strings, and JSON accepts text (as a JSON string).
    pub fn encode(self, value: Value) -> Result<Content, DecodeError> {
        match (self, value) {
            (Codec::Text, Value::Text(s)) => Ok(Content::Text(s)),
            (Codec::Text, Value::Json(serde_json::Value::String(s))) => Ok(Content::Text(s)),
            (Codec::Bytes, Value::Bytes(b)) => Ok(Content::Bytes(b)),
            (Codec::NumericArray, Value::Array(a)) => Ok(Content::Tensor(array_to_tensor(a))),
            (Codec::Json, Value::Json(v)) => Ok(Content::Json(v.to_string())),
            (Codec::Json, Value::Text(s)) => {
                Ok(Content::Json(serde_json::Value::String(s).to_string()))
            }
            (codec, other) => Err(DecodeError::Unencodable {
                codec: codec.name(),
                found: other.kind(),
            }),
        }
    }
}
