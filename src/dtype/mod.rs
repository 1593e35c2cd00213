//! Data type system for sparsekit kernels
//!
//! Every primitive is instantiated for single and double precision. `DType`
//! is the runtime tag for the scalar type of a call; [`Element`] connects it
//! to the Rust types used by the kernels.

mod element;

pub use element::Element;

use std::fmt;

/// Scalar precision of a primitive instantiation
///
/// The discriminant values are stable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point
    F32 = 1,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F64 => 8,
            Self::F32 => 4,
        }
    }

    /// Short name used in kernel symbols (`f32`, `f64`)
    #[inline]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
        }
    }

    /// BLAS-style precision letter used in entry point names
    #[inline]
    pub const fn prefix(self) -> char {
        match self {
            Self::F64 => 'd',
            Self::F32 => 's',
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
