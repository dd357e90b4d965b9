//! Request and response envelopes carried in `Predict` frames.
//!
//! `Content` is a closed union: exactly one variant is active, and
//! [`Content::Empty`] stands for a request without a body.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::value::DType;

/// Response code for a successful call.
pub const CODE_SUCCESS: i32 = 0;

/// Response code for any failed call.
pub const CODE_FAILURE: i32 = -1;

/// Message attached to every successful response.
pub const MSG_SUCCESS: &str = "Succ";

/// Wire form of a numeric array: row-major little-endian element bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Vec<u64>,
    pub data: Bytes,
}

/// Tagged payload union shared by requests and responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Tensor(Tensor),
    Bytes(Bytes),
    /// JSON document as text.
    Json(String),
}

impl Content {
    /// Wire tag of the active variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Content::Empty => "empty",
            Content::Text(_) => "text",
            Content::Tensor(_) => "tensor",
            Content::Bytes(_) => "bytes",
            Content::Json(_) => "json",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }
}

/// Envelope sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub path: String,
    #[serde(default)]
    pub content: Content,
}

impl Request {
    pub fn new(path: impl Into<String>, content: Content) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// Envelope returned to the client.
///
/// `code == 0` exactly when the call succeeded; failures carry empty
/// content and a diagnostic in `msg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub content: Content,
    pub code: i32,
    pub msg: String,
}

impl Response {
    pub fn success(content: Content) -> Self {
        Self {
            content,
            code: CODE_SUCCESS,
            msg: MSG_SUCCESS.to_string(),
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            content: Content::Empty,
            code: CODE_FAILURE,
            msg: msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_has_no_content() {
        let response = Response::failure("boom");
        assert_eq!(response.code, CODE_FAILURE);
        assert!(response.content.is_empty());
        assert!(!response.is_success());
    }

    #[test]
    fn test_success_message() {
        let response = Response::success(Content::Text("hi".into()));
        assert_eq!(response.code, 0);
        assert_eq!(response.msg, "Succ");
    }

    #[test]
    fn test_content_tags() {
        assert_eq!(Content::default().tag(), "empty");
        assert_eq!(Content::Bytes(Bytes::new()).tag(), "bytes");
        assert_eq!(Content::Json("{}".into()).tag(), "json");
    }
}
