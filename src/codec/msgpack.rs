//! MsgPack serialization of envelopes using `rmp-serde`.
//!
//! Always `to_vec_named`: structs go out as maps keyed by field name, so
//! peers in other languages can decode envelopes without knowing field order.

use bytes::Bytes;

use crate::error::Result;

/// MessagePack codec for frame payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value as map-form MsgPack.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        Ok(Bytes::from(rmp_serde::to_vec_named(value)?))
    }

    /// Decode MsgPack bytes into `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Content, Request, Response, Tensor};
    use crate::value::DType;

    #[test]
    fn test_request_envelope_roundtrip() {
        let request = Request::new("/echo", Content::Text("hi".into()));
        let encoded = MsgPackCodec::encode(&request).unwrap();
        let decoded: Request = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_envelope_uses_map_format() {
        let encoded = MsgPackCodec::encode(&Request::new("/", Content::Empty)).unwrap();
        // fixmap with 2 entries, not fixarray
        assert_eq!(encoded[0], 0x82);
    }

    #[test]
    fn test_tensor_data_travels_as_binary() {
        let response = Response::success(Content::Tensor(Tensor {
            dtype: DType::UInt8,
            shape: vec![3],
            data: Bytes::from_static(&[1, 2, 3]),
        }));
        let encoded = MsgPackCodec::encode(&response).unwrap();
        // bin8 marker, length 3, then the raw bytes
        assert!(encoded.windows(5).any(|w| w == [0xc4, 3, 1, 2, 3]));

        let decoded: Response = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_missing_content_defaults_to_empty() {
        #[derive(serde::Serialize)]
        struct Bare<'a> {
            path: &'a str,
        }

        let encoded = MsgPackCodec::encode(&Bare { path: "/" }).unwrap();
        let decoded: Request = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.content, Content::Empty);
    }

    #[test]
    fn test_decode_error_on_garbage() {
        let result: Result<Request> = MsgPackCodec::decode(b"\xc1not msgpack");
        assert!(result.is_err());
    }
}
