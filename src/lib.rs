//! # sparsekit
//!
//! **Sparse linear algebra primitives with GPU-style kernels.**
//!
//! sparsekit implements a small set of sparse BLAS primitives the way a GPU
//! library does: every primitive validates its arguments, computes a launch
//! configuration and runs one or more grid-wide kernels on a stream owned by
//! a [`Handle`](handle::Handle). The same kernels run on the SIMT runtime in
//! [`runtime::simt`] and, with the `cuda` feature, on NVIDIA GPUs.
//!
//! ## Primitives
//!
//! | Primitive | Operation |
//! |-----------|-----------|
//! | `doti` | `sum(x_val[i] * y[x_ind[i]])` for a sparse `x` |
//! | `ell2csr_nnz` + `ell2csr` | ELL to CSR conversion in two steps |
//! | `mcscm` | `C = alpha * A * B + beta * C`, `A` dense, `B` in CSC |
//! | `im2col` | image patches to columns, NCHW and NHWC |
//!
//! Each is generic over [`Element`](dtype::Element) (`f32`, `f64`) in the
//! safe API and exported as `sparsekit_s*` / `sparsekit_d*` in the C ABI
//! ([`ffi`]).
//!
//! ## Quick Start
//!
//! ```
//! use sparsekit::prelude::*;
//!
//! let handle = Handle::with_config(Config::default())?;
//!
//! // ELL matrix [[1, 0], [2, 3]] with two slots per row
//! let descr = MatDescr::new();
//! let ell_col_ind = [0, 0, -1, 1];
//! let ell_val = [1.0f32, 2.0, 0.0, 3.0];
//! let mut row_ptr = [0i32; 3];
//! let mut nnz = 0;
//! handle.ell2csr_nnz(2, 2, &descr, 2, &ell_col_ind, &descr, &mut row_ptr, &mut nnz)?;
//! assert_eq!((row_ptr, nnz), ([0, 1, 3], 3));
//!
//! let mut col_ind = vec![0i32; nnz as usize];
//! let mut val = vec![0.0f32; nnz as usize];
//! handle.ell2csr(2, 2, &descr, 2, &ell_val, &ell_col_ind, &descr, &mut val, &row_ptr, &mut col_ind)?;
//! assert_eq!(col_ind, [0, 0, 1]);
//! assert_eq!(val, [1.0, 2.0, 3.0]);
//! # Ok::<(), sparsekit::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): run the blocks of a grid in parallel
//! - `cuda`: NVIDIA CUDA backend
//!
//! ## Environment
//!
//! - `SPARSEKIT_LAYER`: bit mask of logging layers (1 = trace, 2 = bench)
//! - `SPARSEKIT_SCRATCH_BYTES`: size of the per-handle scratch arena
//! - `SPARSEKIT_NUM_THREADS`: worker threads per stream
//! - `SPARSEKIT_POINTER_MODE`: initial pointer mode of new handles

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dtype;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod logging;
pub mod ops;
pub mod runtime;
pub mod sparse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, LayerMode};
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result, Status};
    pub use crate::handle::{Handle, PointerMode};
    pub use crate::ops::{Im2colLayout, Im2colParams};
    pub use crate::sparse::{IndexBase, MatDescr, MatrixType, Operation};

    #[cfg(feature = "cuda")]
    pub use crate::runtime::cuda::CudaHandle;
}
