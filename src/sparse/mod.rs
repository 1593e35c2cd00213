//! Sparse storage descriptions
//!
//! The primitives never own sparse matrices: callers hand in the raw arrays
//! of a compressed or padded format together with a [`MatDescr`] that says how
//! the indices are based and which structural type the matrix has.
//!
//! # Formats
//!
//! - **CSR**: `row_ptr` (`m + 1` offsets), `col_ind`, `val`
//! - **CSC**: `col_ptr` (`n + 1` offsets), `row_ind`, `val`
//! - **ELL**: `ell_width` slots per row, column-major over slots, padded with
//!   [`ELL_PADDING`]
//!
//! Offsets and indices are `i32` and include the index base.

mod descr;
mod format;

pub use descr::{IndexBase, MatDescr, MatrixType, Operation};
pub use format::{ELL_PADDING, check_compressed, ell_index, ell_slot_is_valid};
