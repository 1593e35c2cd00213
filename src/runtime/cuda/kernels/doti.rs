//! Launchers for the sparse dot product kernels

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaStream, PushKernelArg};

use super::loader::{cuda_launch_config, get_kernel_function, get_or_load_module, kernel_name, kernel_names};
use crate::error::{Error, Result};
use crate::runtime::cuda::CudaElement;
use crate::runtime::simt::kernels::doti::{DOTI_PARTIALS, launch_doti_part1, launch_doti_part2};

/// Launch both passes of `doti`.
///
/// Part 1 leaves one partial sum per block in `workspace`; part 2 folds them
/// into `result`, which may be `workspace` itself.
///
/// # Safety
///
/// All pointers must be valid device addresses: `x_val` and `x_ind` for `nnz`
/// elements, `y` for every element they index, `workspace` for
/// [`DOTI_PARTIALS`] elements and `result` for one.
#[allow(clippy::too_many_arguments)]
pub unsafe fn launch_doti<T: CudaElement>(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    nnz: i32,
    x_val: u64,
    x_ind: u64,
    y: u64,
    workspace: u64,
    result: u64,
    base: i32,
) -> Result<()> {
    let module = get_or_load_module(context, device_index, kernel_names::DOTI_MODULE)?;

    let func = get_kernel_function(&module, &kernel_name("doti_kernel_part1", T::DTYPE))?;
    let cfg = cuda_launch_config("doti_kernel_part1", &launch_doti_part1())?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&nnz);
    builder.arg(&x_val);
    builder.arg(&x_ind);
    builder.arg(&y);
    builder.arg(&workspace);
    builder.arg(&base);
    unsafe { builder.launch(cfg) }
        .map_err(|e| Error::launch("doti_kernel_part1", format!("{e:?}")))?;

    let nblocks = DOTI_PARTIALS as i32;
    let func = get_kernel_function(&module, &kernel_name("doti_kernel_part2", T::DTYPE))?;
    let cfg = cuda_launch_config("doti_kernel_part2", &launch_doti_part2())?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&nblocks);
    builder.arg(&workspace);
    builder.arg(&result);
    unsafe { builder.launch(cfg) }
        .map_err(|e| Error::launch("doti_kernel_part2", format!("{e:?}")))?;

    Ok(())
}
