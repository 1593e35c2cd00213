//! Matrix descriptors and operation flags
//!
//! All enums carry explicit `i32` discriminants: they are passed through the
//! C ABI as plain integers and decoded with `TryFrom<i32>`, which reports an
//! unknown code as [`Error::InvalidValue`].

use std::fmt;

use crate::error::{Error, Result};

/// Offset added to every stored index
#[repr(i32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IndexBase {
    /// Indices start at 0
    #[default]
    Zero = 0,
    /// Indices start at 1
    One = 1,
}

impl IndexBase {
    /// The base as a signed index offset
    #[inline]
    pub const fn offset(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for IndexBase {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(IndexBase::Zero),
            1 => Ok(IndexBase::One),
            _ => Err(Error::invalid_value(
                "idx_base",
                format!("{code} is not an index base (expected 0 or 1)"),
            )),
        }
    }
}

/// Structural type of a sparse matrix
///
/// Only [`MatrixType::General`] is implemented by the primitives.
#[repr(i32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MatrixType {
    /// Unsymmetric matrix, every entry stored
    #[default]
    General = 0,
    /// Symmetric matrix
    Symmetric = 1,
    /// Hermitian matrix
    Hermitian = 2,
    /// Triangular matrix
    Triangular = 3,
}

impl TryFrom<i32> for MatrixType {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(MatrixType::General),
            1 => Ok(MatrixType::Symmetric),
            2 => Ok(MatrixType::Hermitian),
            3 => Ok(MatrixType::Triangular),
            _ => Err(Error::invalid_value(
                "matrix_type",
                format!("{code} is not a matrix type"),
            )),
        }
    }
}

/// Operation applied to a matrix operand
#[repr(i32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Use the operand as stored
    #[default]
    NonTranspose = 111,
    /// Use the transpose of the operand
    Transpose = 112,
    /// Use the conjugate transpose of the operand
    ConjugateTranspose = 113,
}

impl TryFrom<i32> for Operation {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            111 => Ok(Operation::NonTranspose),
            112 => Ok(Operation::Transpose),
            113 => Ok(Operation::ConjugateTranspose),
            _ => Err(Error::invalid_value(
                "operation",
                format!("{code} is not an operation"),
            )),
        }
    }
}

/// Describes how a sparse matrix is stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MatDescr {
    base: IndexBase,
    matrix_type: MatrixType,
}

impl MatDescr {
    /// General matrix with zero-based indices
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the index base
    pub fn with_base(mut self, base: IndexBase) -> Self {
        self.base = base;
        self
    }

    /// Set the matrix type
    pub fn with_type(mut self, matrix_type: MatrixType) -> Self {
        self.matrix_type = matrix_type;
        self
    }

    /// Index base of the stored indices
    #[inline]
    pub fn base(&self) -> IndexBase {
        self.base
    }

    /// Structural matrix type
    #[inline]
    pub fn matrix_type(&self) -> MatrixType {
        self.matrix_type
    }

    pub(crate) fn set_base(&mut self, base: IndexBase) {
        self.base = base;
    }

    pub(crate) fn set_type(&mut self, matrix_type: MatrixType) {
        self.matrix_type = matrix_type;
    }
}

impl fmt::Display for IndexBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

impl fmt::Display for MatDescr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{base={},type={}}}", self.base as i32, self.matrix_type as i32)
    }
}
