//! Conversion between wire [`Tensor`]s and in-process [`NdArray`]s.
//!
//! Element bytes are little endian and row-major; booleans take one byte
//! each and must be `0` or `1`.

use bytes::Bytes;

use crate::error::DecodeError;
use crate::protocol::Tensor;
use crate::value::{element_count, ArrayData, DType, NdArray};

macro_rules! read_le {
    ($data:expr, $ty:ty) => {
        $data
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|chunk| {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(chunk);
                <$ty>::from_le_bytes(buf)
            })
            .collect::<Vec<$ty>>()
    };
}

macro_rules! write_le {
    ($values:expr) => {
        $values
            .iter()
            .flat_map(|x| x.to_le_bytes())
            .collect::<Vec<u8>>()
    };
}

/// Decode a wire tensor, checking shape, dtype and data length agree.
pub fn tensor_to_array(tensor: Tensor) -> Result<NdArray, DecodeError> {
    let Tensor { dtype, shape, data } = tensor;

    let shape = shape
        .into_iter()
        .map(|dim| {
            usize::try_from(dim)
                .map_err(|_| DecodeError::MalformedTensor(format!("dimension {} too large", dim)))
        })
        .collect::<Result<Vec<usize>, _>>()?;

    let expected = element_count(&shape)?
        .checked_mul(dtype.size())
        .ok_or_else(|| DecodeError::MalformedTensor(format!("shape {:?} overflows", shape)))?;
    if data.len() != expected {
        return Err(DecodeError::MalformedTensor(format!(
            "shape {:?} of {:?} needs {} data bytes, got {}",
            shape,
            dtype,
            expected,
            data.len()
        )));
    }

    let values = match dtype {
        DType::Bool => ArrayData::Bool(
            data.iter()
                .map(|&b| match b {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(DecodeError::MalformedTensor(format!(
                        "invalid bool byte {:#04x}",
                        other
                    ))),
                })
                .collect::<Result<_, _>>()?,
        ),
        DType::Int8 => ArrayData::I8(read_le!(data, i8)),
        DType::Int16 => ArrayData::I16(read_le!(data, i16)),
        DType::Int32 => ArrayData::I32(read_le!(data, i32)),
        DType::Int64 => ArrayData::I64(read_le!(data, i64)),
        DType::UInt8 => ArrayData::U8(data.to_vec()),
        DType::UInt16 => ArrayData::U16(read_le!(data, u16)),
        DType::UInt32 => ArrayData::U32(read_le!(data, u32)),
        DType::UInt64 => ArrayData::U64(read_le!(data, u64)),
        DType::Float32 => ArrayData::F32(read_le!(data, f32)),
        DType::Float64 => ArrayData::F64(read_le!(data, f64)),
    };

    NdArray::new(shape, values)
}

/// Encode an array into its wire tensor.
pub fn array_to_tensor(array: NdArray) -> Tensor {
    let dtype = array.dtype();
    let (shape, values) = array.into_parts();

    let data = match values {
        ArrayData::Bool(v) => v.into_iter().map(u8::from).collect(),
        ArrayData::I8(v) => write_le!(v),
        ArrayData::I16(v) => write_le!(v),
        ArrayData::I32(v) => write_le!(v),
        ArrayData::I64(v) => write_le!(v),
        ArrayData::U8(v) => v,
        ArrayData::U16(v) => write_le!(v),
        ArrayData::U32(v) => write_le!(v),
        ArrayData::U64(v) => write_le!(v),
        ArrayData::F32(v) => write_le!(v),
        ArrayData::F64(v) => write_le!(v),
    };

    Tensor {
        dtype,
        shape: shape.into_iter().map(|d| d as u64).collect(),
        data: Bytes::from(data),
    }
}
