//! In-process values exchanged with route handlers.
//!
//! Codecs decode wire content into a [`Value`] and encode a handler's
//! returned [`Value`] back into wire content. Handlers that prefer concrete
//! types go through [`FromValue`] / [`IntoValue`].
//!
//! # Example
//!
//! ```
//! use predictwire::value::{ArrayData, DType, NdArray, Value};
//!
//! let array = NdArray::new(vec![2, 2], ArrayData::F32(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
//! assert_eq!(array.dtype(), DType::Float32);
//!
//! let value = Value::Array(array);
//! assert_eq!(value.kind(), "array");
//! ```

use anyhow::{anyhow, bail};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Element type of a numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    Float32,
    Float64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
        }
    }
}

/// Flattened, row-major element storage of an [`NdArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Runs `$body` with `$v` bound to the inner vector, whatever the element type.
macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($v) => $body,
            ArrayData::I8($v) => $body,
            ArrayData::I16($v) => $body,
            ArrayData::I32($v) => $body,
            ArrayData::I64($v) => $body,
            ArrayData::U8($v) => $body,
            ArrayData::U16($v) => $body,
            ArrayData::U32($v) => $body,
            ArrayData::U64($v) => $body,
            ArrayData::F32($v) => $body,
            ArrayData::F64($v) => $body,
        }
    };
}

/// Like `with_data!`, but rewraps the produced vector in the same variant.
macro_rules! map_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($v) => ArrayData::Bool($body),
            ArrayData::I8($v) => ArrayData::I8($body),
            ArrayData::I16($v) => ArrayData::I16($body),
            ArrayData::I32($v) => ArrayData::I32($body),
            ArrayData::I64($v) => ArrayData::I64($body),
            ArrayData::U8($v) => ArrayData::U8($body),
            ArrayData::U16($v) => ArrayData::U16($body),
            ArrayData::U32($v) => ArrayData::U32($body),
            ArrayData::U64($v) => ArrayData::U64($body),
            ArrayData::F32($v) => ArrayData::F32($body),
            ArrayData::F64($v) => ArrayData::F64($body),
        }
    };
}

impl ArrayData {
    /// Element type of the stored data.
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::I8(_) => DType::Int8,
            ArrayData::I16(_) => DType::Int16,
            ArrayData::I32(_) => DType::Int32,
            ArrayData::I64(_) => DType::Int64,
            ArrayData::U8(_) => DType::UInt8,
            ArrayData::U16(_) => DType::UInt16,
            ArrayData::U32(_) => DType::UInt32,
            ArrayData::U64(_) => DType::UInt64,
            ArrayData::F32(_) => DType::Float32,
            ArrayData::F64(_) => DType::Float64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_array_data_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for ArrayData {
                fn from(v: Vec<$ty>) -> Self {
                    ArrayData::$variant(v)
                }
            }
        )*
    };
}

impl_array_data_from!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

/// Multi-dimensional numeric array with a fixed shape and element type.
///
/// The number of elements always equals the product of the shape
/// (an empty shape is a scalar holding one element).
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Create an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, DecodeError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(DecodeError::MalformedTensor(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array over `data`.
    pub fn from_vec(data: impl Into<ArrayData>) -> Self {
        let data = data.into();
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (Vec<usize>, ArrayData) {
        (self.shape, self.data)
    }

    /// Split along the first axis: an `[n, a, b]` array yields `n` arrays of shape `[a, b]`.
    ///
    /// Returns `None` for scalars.
    pub fn rows(&self) -> Option<Vec<NdArray>> {
        let (&count, rest) = self.shape.split_first()?;
        let row_len: usize = rest.iter().product();
        let rows = (0..count)
            .map(|i| {
                let range = i * row_len..(i + 1) * row_len;
                NdArray {
                    shape: rest.to_vec(),
                    data: map_data!(&self.data, v => v[range.clone()].to_vec()),
                }
            })
            .collect();
        Some(rows)
    }
}

/// Product of `shape`, failing on overflow.
pub(crate) fn element_count(shape: &[usize]) -> Result<usize, DecodeError> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim).ok_or_else(|| {
            DecodeError::MalformedTensor(format!("shape {:?} overflows", shape))
        })
    })
}

/// A decoded argument or a handler's return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single string.
    Text(String),
    /// A raw byte buffer.
    Bytes(Bytes),
    /// A numeric array.
    Array(NdArray),
    /// A structured tree (mapping, sequence or scalar).
    Json(serde_json::Value),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Json(_) => "json",
        }
    }
}

/// Wrapper that moves any serde type through the JSON value variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

/// Conversion from a decoded [`Value`] into a handler argument.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> anyhow::Result<Self>;
}

/// Conversion from a handler's return into a [`Value`].
pub trait IntoValue {
    fn into_value(self) -> anyhow::Result<Value>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Json(serde_json::Value::String(s)) => Ok(s),
            other => bail!("expected text, got {}", other.kind()),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => bail!("expected bytes, got {}", other.kind()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        Bytes::from_value(value).map(|b| b.to_vec())
    }
}

impl FromValue for NdArray {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Array(a) => Ok(a),
            other => bail!("expected array, got {}", other.kind()),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Json(v) => Ok(v),
            Value::Text(s) => Ok(serde_json::Value::String(s)),
            other => bail!("expected json, got {}", other.kind()),
        }
    }
}

impl<T: DeserializeOwned> FromValue for Json<T> {
    fn from_value(value: Value) -> anyhow::Result<Self> {
        let json = serde_json::Value::from_value(value)?;
        serde_json::from_value(json)
            .map(Json)
            .map_err(|e| anyhow!("invalid argument: {}", e))
    }
}

impl IntoValue for Value {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Text(self))
    }
}

impl IntoValue for &str {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Text(self.to_string()))
    }
}

impl IntoValue for Bytes {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Bytes(self))
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Bytes(Bytes::from(self)))
    }
}

impl IntoValue for NdArray {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Array(self))
    }
}

impl IntoValue for serde_json::Value {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Json(self))
    }
}

impl<T: Serialize> IntoValue for Json<T> {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(Value::Json(serde_json::to_value(self.0)?))
    }
}
