//! Element-wise kernels on little-endian byte slices.
//!
//! These stand in for the tensor runtime's numeric kernels: the ring transport
//! uses [`reduce_slice`] for its local reduction steps and the coalescer uses
//! [`div_slice`] for the pre-divide.

use crate::error::{CoalesceError, Result};
use crate::types::{DataType, ReduceOp};
use half::{bf16, f16};

/// Fixed-width element encoded little-endian on the wire.
pub(crate) trait LeBytes: Copy + Sized {
    const SIZE: usize;
    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_le_bytes {
    ($($ty:ty),*) => {
        $(
            impl LeBytes for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    Self::from_le_bytes(
                        bytes.try_into().expect("slice length matches type size"),
                    )
                }
                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_bytes!(i8, i32, i64, u8, u32, u64, f32, f64, f16, bf16);

/// Types that support the four reduction operations.
pub(crate) trait Reducible: LeBytes {
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;
}

/// Floating types that support division by the group size.
pub(crate) trait Divisible: LeBytes {
    fn div_by(self, divisor: usize) -> Self;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
            }

            impl Divisible for $ty {
                #[inline]
                fn div_by(self, divisor: usize) -> Self {
                    self / divisor as $ty
                }
            }
        )*
    };
    // Half types accumulate in f32 and round back once per element.
    (half: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    let r = f32::reduce(a.to_f32(), b.to_f32(), op);
                    <$ty>::from_f32(r)
                }
            }

            impl Divisible for $ty {
                #[inline]
                fn div_by(self, divisor: usize) -> Self {
                    <$ty>::from_f32(self.to_f32() / divisor as f32)
                }
            }
        )*
    };
}

impl_reducible!(int: i8, i32, i64, u8, u32, u64);
impl_reducible!(float: f32, f64);
impl_reducible!(half: f16, bf16);

/// Element-wise reduce on byte slices interpreted as `dtype` elements.
///
/// `dst` and `src` must both contain exactly `count * dtype.size_in_bytes()` bytes.
pub(crate) fn reduce_slice(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
) -> Result<()> {
    let expected = count * dtype.size_in_bytes();
    if dst.len() != expected || src.len() != expected {
        return Err(CoalesceError::BufferSizeMismatch {
            expected,
            actual: if dst.len() != expected {
                dst.len()
            } else {
                src.len()
            },
        });
    }
    match dtype {
        DataType::F32 => reduce_slice_typed::<f32>(dst, src, op),
        DataType::F64 => reduce_slice_typed::<f64>(dst, src, op),
        DataType::F16 => reduce_slice_typed::<f16>(dst, src, op),
        DataType::BF16 => reduce_slice_typed::<bf16>(dst, src, op),
        DataType::I8 => reduce_slice_typed::<i8>(dst, src, op),
        DataType::I32 => reduce_slice_typed::<i32>(dst, src, op),
        DataType::I64 => reduce_slice_typed::<i64>(dst, src, op),
        DataType::U8 => reduce_slice_typed::<u8>(dst, src, op),
        DataType::U32 => reduce_slice_typed::<u32>(dst, src, op),
        DataType::U64 => reduce_slice_typed::<u64>(dst, src, op),
    }
    Ok(())
}

/// In-place `buf[i] /= divisor` for floating-point `dtype`.
///
/// Integer types are rejected: an averaged integer tensor is not
/// representable without choosing a rounding policy.
pub(crate) fn div_slice(buf: &mut [u8], dtype: DataType, divisor: usize) -> Result<()> {
    if buf.len() % dtype.size_in_bytes() != 0 {
        return Err(CoalesceError::BufferSizeMismatch {
            expected: buf.len() - buf.len() % dtype.size_in_bytes(),
            actual: buf.len(),
        });
    }
    if divisor == 1 {
        return Ok(());
    }
    match dtype {
        DataType::F32 => div_slice_typed::<f32>(buf, divisor),
        DataType::F64 => div_slice_typed::<f64>(buf, divisor),
        DataType::F16 => div_slice_typed::<f16>(buf, divisor),
        DataType::BF16 => div_slice_typed::<bf16>(buf, divisor),
        _ => {
            return Err(CoalesceError::UnsupportedDType {
                dtype,
                op: "div_scalar",
            });
        }
    }
    Ok(())
}

fn reduce_slice_typed<T: Reducible>(dst: &mut [u8], src: &[u8], op: ReduceOp) {
    for (d, s) in dst.chunks_exact_mut(T::SIZE).zip(src.chunks_exact(T::SIZE)) {
        let r = T::reduce(T::read_le(d), T::read_le(s), op);
        r.write_le(d);
    }
}

fn div_slice_typed<T: Divisible>(buf: &mut [u8], divisor: usize) {
    for e in buf.chunks_exact_mut(T::SIZE) {
        T::read_le(e).div_by(divisor).write_le(e);
    }
}
