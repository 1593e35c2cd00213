//! Launchers for the im2col kernels

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaStream, PushKernelArg};

use super::loader::{cuda_launch_config, get_kernel_function, get_or_load_module, kernel_name, kernel_names};
use crate::error::{Error, Result};
use crate::ops::{Im2colLayout, Im2colParams};
use crate::runtime::cuda::CudaElement;
use crate::runtime::simt::kernels::im2col::launch_im2col as im2col_geometry;

/// Launch the im2col kernel for `layout`.
///
/// Every extent of `params` must fit in `i32`.
///
/// # Safety
///
/// `im` must hold `params.im_len()` and `col` `params.col_len()` device
/// elements.
pub unsafe fn launch_im2col<T: CudaElement>(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    im: u64,
    params: &Im2colParams,
    layout: Im2colLayout,
    col: u64,
) -> Result<()> {
    let base_name = match layout {
        Im2colLayout::Nchw => "im2col_nchw_kernel",
        Im2colLayout::Nhwc => "im2col_nhwc_kernel",
    };
    let module = get_or_load_module(context, device_index, kernel_names::IM2COL_MODULE)?;
    let func = get_kernel_function(&module, &kernel_name(base_name, T::DTYPE))?;
    let cfg = cuda_launch_config(base_name, &im2col_geometry::<T>(params)?)?;

    let p = params;
    let geometry = [
        p.batch, p.channels, p.height, p.width, p.kernel_h, p.kernel_w, p.output_h, p.output_w, p.pad_h,
        p.pad_w, p.stride_h, p.stride_w,
    ]
    .map(|v| v as i32);

    let mut builder = stream.launch_builder(&func);
    builder.arg(&im);
    for v in &geometry {
        builder.arg(v);
    }
    builder.arg(&col);
    unsafe { builder.launch(cfg) }.map_err(|e| Error::launch(base_name, format!("{e:?}")))?;
    Ok(())
}
