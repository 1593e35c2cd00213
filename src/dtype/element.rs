//! Element trait for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use num_traits::Float;
use std::fmt::{Debug, Display};

/// Trait for scalar types a primitive can be instantiated for
///
/// This trait connects Rust's type system to the runtime dtype tag. It is
/// implemented for `f32` and `f64`.
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - values cross block boundaries freely
/// - `Pod + Zeroable` - the scratch arena hands out typed views of raw storage
/// - `Float` - arithmetic, `mul_add` (fused multiply-add) and NaN handling
pub trait Element:
    Copy + Send + Sync + Pod + Zeroable + Float + Debug + Display + 'static
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Fused multiply-add `a * b + c` with a single rounding
    #[inline]
    fn fma(a: Self, b: Self, c: Self) -> Self {
        a.mul_add(b, c)
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}
