//! Device kernels of the sparse primitives
//!
//! One submodule per primitive, holding the kernel types and the `launch_*`
//! function that sizes their grid. Block sizes and tile shapes are collected
//! in [`launch`].

pub mod launch;
pub mod reduce;

pub mod doti;
pub mod ell2csr;
pub mod im2col;
pub mod mcscm;

pub use launch::*;
