//! Launchers for the ELL to CSR conversion kernels

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaStream, PushKernelArg};

use super::loader::{cuda_launch_config, get_kernel_function, get_or_load_module, kernel_name, kernel_names};
use crate::error::{Error, Result};
use crate::runtime::cuda::CudaElement;
use crate::runtime::simt::kernels::ell2csr::{launch_ell2csr_rows, launch_row_ptr_scan};

/// Seed `csr_row_ptr[0]` and count the valid slots of every row.
///
/// # Safety
///
/// `ell_col_ind` must hold `m * ell_width` and `csr_row_ptr` `m + 1` device
/// elements.
#[allow(clippy::too_many_arguments)]
pub unsafe fn launch_ell2csr_index_base(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    m: i32,
    n: i32,
    ell_width: i32,
    ell_col_ind: u64,
    ell_base: i32,
    csr_row_ptr: u64,
    csr_base: i32,
) -> Result<()> {
    let module = get_or_load_module(context, device_index, kernel_names::ELL2CSR_MODULE)?;
    let func = get_kernel_function(&module, "ell2csr_index_base")?;
    let cfg = cuda_launch_config("ell2csr_index_base", &launch_ell2csr_rows(m as usize)?)?;

    let mut builder = stream.launch_builder(&func);
    builder.arg(&m);
    builder.arg(&n);
    builder.arg(&ell_width);
    builder.arg(&ell_col_ind);
    builder.arg(&ell_base);
    builder.arg(&csr_row_ptr);
    builder.arg(&csr_base);
    unsafe { builder.launch(cfg) }
        .map_err(|e| Error::launch("ell2csr_index_base", format!("{e:?}")))?;
    Ok(())
}

/// Turn per-row counts into row pointers and write the entry count to `nnz`.
///
/// # Safety
///
/// `csr_row_ptr` must hold `m + 1` device elements and `nnz` one.
pub unsafe fn launch_ell2csr_row_ptr_scan(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    m: i32,
    csr_row_ptr: u64,
    csr_base: i32,
    nnz: u64,
) -> Result<()> {
    let module = get_or_load_module(context, device_index, kernel_names::ELL2CSR_MODULE)?;
    let func = get_kernel_function(&module, "ell2csr_row_ptr_scan")?;
    let cfg = cuda_launch_config("ell2csr_row_ptr_scan", &launch_row_ptr_scan())?;

    let mut builder = stream.launch_builder(&func);
    builder.arg(&m);
    builder.arg(&csr_row_ptr);
    builder.arg(&csr_base);
    builder.arg(&nnz);
    unsafe { builder.launch(cfg) }
        .map_err(|e| Error::launch("ell2csr_row_ptr_scan", format!("{e:?}")))?;
    Ok(())
}

/// Fill `len` device integers with `value`.
///
/// # Safety
///
/// `out` must hold `len` device elements.
pub unsafe fn launch_set_array_to_value(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    len: i32,
    value: i32,
    out: u64,
) -> Result<()> {
    let module = get_or_load_module(context, device_index, kernel_names::ELL2CSR_MODULE)?;
    let func = get_kernel_function(&module, "set_array_to_value")?;
    let cfg = cuda_launch_config("set_array_to_value", &launch_ell2csr_rows(len as usize)?)?;

    let mut builder = stream.launch_builder(&func);
    builder.arg(&len);
    builder.arg(&value);
    builder.arg(&out);
    unsafe { builder.launch(cfg) }
        .map_err(|e| Error::launch("set_array_to_value", format!("{e:?}")))?;
    Ok(())
}

/// Copy the valid ELL slots of every row to its CSR range.
///
/// # Safety
///
/// The ELL arrays must hold `m * ell_width` device elements, `csr_row_ptr`
/// `m + 1`, and the CSR arrays the entry count the row pointers describe.
#[allow(clippy::too_many_arguments)]
pub unsafe fn launch_ell2csr_fill<T: CudaElement>(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    m: i32,
    n: i32,
    ell_width: i32,
    ell_col_ind: u64,
    ell_val: u64,
    ell_base: i32,
    csr_row_ptr: u64,
    csr_col_ind: u64,
    csr_val: u64,
    csr_base: i32,
) -> Result<()> {
    let module = get_or_load_module(context, device_index, kernel_names::ELL2CSR_MODULE)?;
    let func = get_kernel_function(&module, &kernel_name("ell2csr_fill", T::DTYPE))?;
    let cfg = cuda_launch_config("ell2csr_fill", &launch_ell2csr_rows(m as usize)?)?;

    let mut builder = stream.launch_builder(&func);
    builder.arg(&m);
    builder.arg(&n);
    builder.arg(&ell_width);
    builder.arg(&ell_col_ind);
    builder.arg(&ell_val);
    builder.arg(&ell_base);
    builder.arg(&csr_row_ptr);
    builder.arg(&csr_col_ind);
    builder.arg(&csr_val);
    builder.arg(&csr_base);
    unsafe { builder.launch(cfg) }
        .map_err(|e| Error::launch("ell2csr_fill", format!("{e:?}")))?;
    Ok(())
}
