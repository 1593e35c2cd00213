//! CUDA kernels for the sparse primitives
//!
//! Kernels are written in CUDA C++ (.cu files) and compiled to PTX by
//! build.rs. The PTX is loaded at runtime and cached per device.
//!
//! # Kernel Files
//!
//! - `doti.cu` - two-pass sparse dot product
//! - `ell2csr.cu` - row counts, row-pointer scan and fill
//! - `mcscm.cu` - dense x CSC product, host and device scalar variants
//! - `im2col.cu` - NCHW and NHWC unrolling

mod doti;
mod ell2csr;
mod im2col;
mod loader;
mod mcscm;

pub use doti::launch_doti;
pub use ell2csr::{
    launch_ell2csr_fill, launch_ell2csr_index_base, launch_ell2csr_row_ptr_scan,
    launch_set_array_to_value,
};
pub use im2col::launch_im2col;
pub use loader::{cuda_launch_config, get_kernel_function, get_or_load_module, kernel_name, kernel_names};
pub use mcscm::{McscmPtrs, McscmScalars, launch_mcscmnn_kernel};
