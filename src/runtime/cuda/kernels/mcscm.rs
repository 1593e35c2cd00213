//! Launchers for the dense x CSC product kernels

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaStream, PushKernelArg};

use super::loader::{cuda_launch_config, get_kernel_function, get_or_load_module, kernel_name, kernel_names};
use crate::error::{Error, Result};
use crate::runtime::cuda::CudaElement;
use crate::runtime::simt::kernels::mcscm::launch_mcscmnn;

/// Device addresses and extents shared by both pointer-mode variants
#[derive(Debug, Clone, Copy)]
pub struct McscmPtrs {
    /// Rows of `A` and `C`
    pub m: i32,
    /// Columns of `B` and `C`
    pub n: i32,
    /// Dense `A`
    pub a: u64,
    /// Leading dimension of `A`
    pub lda: i32,
    /// Column pointers of `B`
    pub csc_col_ptr: u64,
    /// Row indices of `B`
    pub csc_row_ind: u64,
    /// Values of `B`
    pub csc_val: u64,
    /// Dense `C`
    pub c: u64,
    /// Leading dimension of `C`
    pub ldc: i32,
    /// Index base of `B`
    pub base: i32,
}

/// Scalars of one `mcscm` launch
#[derive(Debug, Clone, Copy)]
pub enum McscmScalars<T> {
    /// Values read on the host
    Host {
        /// Scale of the product
        alpha: T,
        /// Scale of the prior `C`
        beta: T,
    },
    /// Device addresses read by the kernel
    Device {
        /// Address of alpha
        alpha: u64,
        /// Address of beta
        beta: u64,
    },
}

/// Launch the `mcscmnn` kernel matching the scalar location.
///
/// # Safety
///
/// Every address in `ptrs` (and the device scalars) must be valid for the
/// extents implied by `m`, `n`, the leading dimensions and the column
/// pointers.
pub unsafe fn launch_mcscmnn_kernel<T: CudaElement>(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    ptrs: &McscmPtrs,
    scalars: McscmScalars<T>,
) -> Result<()> {
    let base_name = match scalars {
        McscmScalars::Host { .. } => "mcscmnn_kernel_host_pointer",
        McscmScalars::Device { .. } => "mcscmnn_kernel_device_pointer",
    };
    let module = get_or_load_module(context, device_index, kernel_names::MCSCM_MODULE)?;
    let func = get_kernel_function(&module, &kernel_name(base_name, T::DTYPE))?;
    let cfg = cuda_launch_config(base_name, &launch_mcscmnn(ptrs.m as usize, ptrs.n as usize)?)?;

    let mut builder = stream.launch_builder(&func);
    builder.arg(&ptrs.m);
    builder.arg(&ptrs.n);
    match &scalars {
        McscmScalars::Host { alpha, .. } => builder.arg(alpha),
        McscmScalars::Device { alpha, .. } => builder.arg(alpha),
    };
    builder.arg(&ptrs.a);
    builder.arg(&ptrs.lda);
    builder.arg(&ptrs.csc_col_ptr);
    builder.arg(&ptrs.csc_row_ind);
    builder.arg(&ptrs.csc_val);
    match &scalars {
        McscmScalars::Host { beta, .. } => builder.arg(beta),
        McscmScalars::Device { beta, .. } => builder.arg(beta),
    };
    builder.arg(&ptrs.c);
    builder.arg(&ptrs.ldc);
    builder.arg(&ptrs.base);
    unsafe { builder.launch(cfg) }.map_err(|e| Error::launch(base_name, format!("{e:?}")))?;
    Ok(())
}
