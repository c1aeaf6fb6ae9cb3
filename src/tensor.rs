//! Host tensors and borrowed flat views.
//!
//! A [`Tensor`] owns little-endian element bytes plus a [`DataType`] and a
//! shape. The coalescer only ever looks at the flattened element sequence;
//! the shape is carried so callers can reshape outputs.

use crate::error::{CoalesceError, Result};
use crate::types::DataType;
use half::{bf16, f16};

mod private {
    pub trait Sealed {}
}

/// Rust element types with a matching [`DataType`].
pub trait Element: private::Sealed + Copy + 'static {
    const DTYPE: DataType;

    #[doc(hidden)]
    fn write_le(self, out: &mut [u8]);

    #[doc(hidden)]
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dt:expr),* $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl Element for $ty {
                const DTYPE: DataType = $dt;

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    Self::from_le_bytes(
                        bytes.try_into().expect("slice length matches type size"),
                    )
                }
            }
        )*
    };
}

impl_element!(
    f32 => DataType::F32,
    f64 => DataType::F64,
    f16 => DataType::F16,
    bf16 => DataType::BF16,
    i8 => DataType::I8,
    i32 => DataType::I32,
    i64 => DataType::I64,
    u8 => DataType::U8,
    u32 => DataType::U32,
    u64 => DataType::U64,
);

fn encode<T: Element>(values: &[T]) -> Vec<u8> {
    let size = T::DTYPE.size_in_bytes();
    let mut data = vec![0u8; values.len() * size];
    for (v, out) in values.iter().zip(data.chunks_exact_mut(size)) {
        v.write_le(out);
    }
    data
}

fn decode<T: Element>(bytes: &[u8], dtype: DataType) -> Result<Vec<T>> {
    if T::DTYPE != dtype {
        return Err(CoalesceError::mismatch(format!(
            "requested {} elements from a {dtype} tensor",
            T::DTYPE
        )));
    }
    Ok(bytes
        .chunks_exact(dtype.size_in_bytes())
        .map(T::read_le)
        .collect())
}

/// A contiguous host tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<u8>,
    shape: Vec<usize>,
    dtype: DataType,
}

impl Tensor {
    /// Build a tensor of the given shape from row-major values.
    pub fn from_slice<T: Element>(values: &[T], shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != values.len() {
            return Err(CoalesceError::mismatch(format!(
                "shape {shape:?} holds {numel} elements, got {}",
                values.len()
            )));
        }
        Ok(Self {
            data: encode(values),
            shape: shape.to_vec(),
            dtype: T::DTYPE,
        })
    }

    /// Build a 1-D tensor.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        Self {
            shape: vec![values.len()],
            data: encode(&values),
            dtype: T::DTYPE,
        }
    }

    /// A tensor of `shape` with every element set to `value`.
    pub fn full<T: Element>(value: T, shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            data: encode(&vec![value; numel]),
            shape: shape.to_vec(),
            dtype: T::DTYPE,
        }
    }

    /// A zero-filled tensor.
    pub fn zeros(dtype: DataType, shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            data: vec![0u8; numel * dtype.size_in_bytes()],
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Wrap raw little-endian bytes.
    pub fn from_bytes(dtype: DataType, shape: &[usize], data: Vec<u8>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        let expected = numel * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(CoalesceError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
            dtype,
        })
    }

    pub fn numel(&self) -> usize {
        self.data.len() / self.dtype.size_in_bytes()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Flattened, borrowed view over the whole tensor.
    pub fn flatten_view(&self) -> TensorView<'_> {
        TensorView {
            bytes: &self.data,
            dtype: self.dtype,
        }
    }

    /// Copy the elements out as `T`. Fails if `T` does not match the dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        decode(&self.data, self.dtype)
    }
}

/// A borrowed, flat run of elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorView<'a> {
    bytes: &'a [u8],
    dtype: DataType,
}

impl<'a> TensorView<'a> {
    pub(crate) fn new(bytes: &'a [u8], dtype: DataType) -> Self {
        debug_assert_eq!(bytes.len() % dtype.size_in_bytes(), 0);
        Self { bytes, dtype }
    }

    pub fn numel(&self) -> usize {
        self.bytes.len() / self.dtype.size_in_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        decode(self.bytes, self.dtype)
    }

    /// Copy into an owned 1-D tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor {
            data: self.bytes.to_vec(),
            shape: vec![self.numel()],
            dtype: self.dtype,
        }
    }
}
