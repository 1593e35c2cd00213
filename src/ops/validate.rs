//! Argument checks shared by every primitive
//!
//! Entry points check in a fixed order and report the first failure:
//!
//! 1. handle
//! 2. null pointers
//! 3. enumerated values (index base, matrix type, operation, layout)
//! 4. sizes (negative dimensions, zero strides, leading dimensions, buffer lengths)
//! 5. unsupported combinations
//!
//! Problems that pass every check but have nothing to compute return before
//! any device work.

use crate::error::{Error, Result};
use crate::sparse::{MatDescr, MatrixType};

/// Convert a C dimension to `usize`, rejecting negative values
#[inline]
pub fn check_non_negative(arg: &'static str, value: i32) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid_size(arg, format!("{arg} = {value} is negative")))
}

/// Reject a null pointer
#[inline]
pub fn check_not_null<T>(arg: &'static str, ptr: *const T) -> Result<()> {
    if ptr.is_null() {
        return Err(Error::invalid_pointer(arg));
    }
    Ok(())
}

/// Only general matrices are implemented
#[inline]
pub fn check_general(arg: &'static str, descr: &MatDescr) -> Result<()> {
    match descr.matrix_type() {
        MatrixType::General => Ok(()),
        _ => {
            log::debug!("{arg}: matrix type {:?} is not implemented", descr.matrix_type());
            Err(Error::not_implemented("non-general matrix type"))
        }
    }
}

/// A column-major operand with `rows` rows needs `ld >= max(1, rows)`
#[inline]
pub fn check_leading_dim(arg: &'static str, ld: usize, rows: usize) -> Result<()> {
    if ld < rows.max(1) {
        return Err(Error::invalid_size(
            arg,
            format!("{arg} = {ld} is smaller than max(1, {rows})"),
        ));
    }
    Ok(())
}

/// Strides must be positive
#[inline]
pub fn check_stride(arg: &'static str, stride: usize) -> Result<()> {
    if stride == 0 {
        return Err(Error::invalid_size(arg, format!("{arg} must be positive")));
    }
    Ok(())
}

/// A caller buffer must hold at least `required` elements
#[inline]
pub fn check_len(arg: &'static str, len: usize, required: usize) -> Result<()> {
    if len < required {
        return Err(Error::invalid_size(
            arg,
            format!("buffer holds {len} elements, {required} required"),
        ));
    }
    Ok(())
}

/// Returns true if any extent is zero
#[inline]
pub fn is_degenerate(extents: &[usize]) -> bool {
    extents.contains(&0)
}

/// Elements spanned by a column-major `rows x cols` matrix with leading
/// dimension `ld`
#[inline]
pub fn dense_len(ld: usize, rows: usize, cols: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        ld.saturating_mul(cols - 1).saturating_add(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn test_non_negative() {
        assert_eq!(check_non_negative("m", 5).unwrap(), 5);
        assert_eq!(check_non_negative("m", 0).unwrap(), 0);
        let err = check_non_negative("nnz", -1).unwrap_err();
        assert_eq!(err.status(), Status::InvalidSize);
    }

    #[test]
    fn test_not_null() {
        let v = 1.0f32;
        assert!(check_not_null("x", &v as *const f32).is_ok());
        assert!(matches!(
            check_not_null("x", std::ptr::null::<f32>()),
            Err(Error::InvalidPointer { arg: "x" })
        ));
    }

    #[test]
    fn test_general_only() {
        assert!(check_general("descr", &MatDescr::new()).is_ok());
        let sym = MatDescr::new().with_type(MatrixType::Symmetric);
        assert_eq!(
            check_general("descr", &sym).unwrap_err().status(),
            Status::NotImplemented
        );
    }

    #[test]
    fn test_leading_dim() {
        assert!(check_leading_dim("lda", 4, 4).is_ok());
        assert!(check_leading_dim("lda", 3, 4).is_err());
        assert!(check_leading_dim("lda", 1, 0).is_ok());
        assert!(check_leading_dim("lda", 0, 0).is_err());
    }

    #[test]
    fn test_dense_len() {
        assert_eq!(dense_len(10, 4, 3), 24);
        assert_eq!(dense_len(10, 0, 3), 0);
        assert_eq!(dense_len(10, 4, 0), 0);
        assert!(is_degenerate(&[3, 0, 2]));
        assert!(!is_degenerate(&[3, 1, 2]));
    }
}
