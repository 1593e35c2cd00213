//! Execution context on a CUDA device

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use cudarc::driver::safe::{CudaContext, CudaStream};
use cudarc::driver::sys::{self, CUresult};
use log::{debug, warn};
use parking_lot::Mutex;

use super::CudaElement;
use super::kernels::{
    McscmPtrs, McscmScalars, launch_doti, launch_ell2csr_fill, launch_ell2csr_index_base,
    launch_ell2csr_row_ptr_scan, launch_im2col, launch_mcscmnn_kernel, launch_set_array_to_value,
};
use crate::config::{Config, LayerMode};
use crate::error::{Error, Result};
use crate::handle::PointerMode;
use crate::logging::{Addr, log_trace, replace_x};
use crate::ops::validate::{check_general, check_leading_dim, check_stride, is_degenerate};
use crate::ops::{Im2colLayout, Im2colParams};
use crate::runtime::simt::kernels::doti::DOTI_PARTIALS;
use crate::sparse::{IndexBase, MatDescr, Operation};

/// Stream-ordered device allocation backing the scratch arena
struct DeviceScratch {
    ptr: u64,
    bytes: usize,
    stream: Arc<CudaStream>,
}

impl DeviceScratch {
    fn new(stream: Arc<CudaStream>, bytes: usize) -> Result<Self> {
        let mut ptr = 0u64;
        if bytes > 0 {
            // SAFETY: ptr is a valid out-parameter and the stream is live
            let result = unsafe { sys::cuMemAllocAsync(&mut ptr, bytes, stream.cu_stream()) };
            if result != CUresult::CUDA_SUCCESS {
                return Err(Error::OutOfMemory { size: bytes });
            }
        }
        Ok(Self { ptr, bytes, stream })
    }

    /// Address of the first `len` elements of the arena as `T`
    fn typed<T>(&self, len: usize) -> Result<u64> {
        let bytes = len.saturating_mul(size_of::<T>());
        if bytes > self.bytes {
            return Err(Error::OutOfMemory { size: bytes });
        }
        Ok(self.ptr)
    }
}

impl Drop for DeviceScratch {
    fn drop(&mut self) {
        if self.ptr == 0 {
            return;
        }
        // SAFETY: allocated on this stream by cuMemAllocAsync
        let result = unsafe { sys::cuMemFreeAsync(self.ptr, self.stream.cu_stream()) };
        if result != CUresult::CUDA_SUCCESS {
            warn!("failed to free the scratch arena ({result:?})");
        }
    }
}

/// Execution context of the primitives on one CUDA device
///
/// Calls through one handle are serialised on its stream and its scratch
/// arena.
pub struct CudaHandle {
    device_index: usize,
    context: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    pointer_mode: PointerMode,
    layer: LayerMode,
    scratch: Mutex<DeviceScratch>,
}

fn to_i32(arg: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::invalid_size(arg, format!("{arg} = {value} does not fit the device index type")))
}

fn check_device_ptr(arg: &'static str, ptr: u64) -> Result<()> {
    if ptr == 0 {
        return Err(Error::invalid_pointer(arg));
    }
    Ok(())
}

impl CudaHandle {
    /// Create a handle on `device_index` from the process-wide configuration
    pub fn new(device_index: usize) -> Result<Self> {
        Self::with_config(device_index, Config::global().clone())
    }

    /// Create a handle on `device_index` from an explicit configuration
    ///
    /// `num_threads` has no meaning on a GPU and is ignored.
    pub fn with_config(device_index: usize, config: Config) -> Result<Self> {
        let context = CudaContext::new(device_index).map_err(|e| {
            Error::Cuda(format!("failed to create context for device {device_index}: {e:?}"))
        })?;
        context
            .bind_to_thread()
            .map_err(|e| Error::Cuda(format!("failed to bind context to thread: {e:?}")))?;
        let stream = context
            .new_stream()
            .map_err(|e| Error::Cuda(format!("failed to create stream: {e:?}")))?;
        let scratch = DeviceScratch::new(stream.clone(), config.scratch_bytes)?;
        debug!(
            "CUDA handle created: device={device_index} pointer_mode={} scratch={}B",
            config.pointer_mode, config.scratch_bytes
        );
        Ok(Self {
            device_index,
            context,
            stream,
            pointer_mode: config.pointer_mode,
            layer: config.layer,
            scratch: Mutex::new(scratch),
        })
    }

    /// Index of the device
    #[inline]
    pub fn device_index(&self) -> usize {
        self.device_index
    }

    /// Current pointer mode
    #[inline]
    pub fn pointer_mode(&self) -> PointerMode {
        self.pointer_mode
    }

    /// Change where scalar arguments live for subsequent calls
    pub fn set_pointer_mode(&mut self, mode: PointerMode) {
        self.pointer_mode = mode;
    }

    /// Active logging layers
    #[inline]
    pub fn layer(&self) -> LayerMode {
        self.layer
    }

    /// Change the logging layers for subsequent calls
    pub fn set_layer(&mut self, layer: LayerMode) {
        self.layer = layer;
    }

    /// Block until all work queued on the stream has finished
    pub fn synchronize(&self) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| Error::Cuda(format!("stream synchronize failed: {e:?}")))
    }

    fn bind(&self) -> Result<()> {
        self.context
            .bind_to_thread()
            .map_err(|e| Error::Cuda(format!("failed to bind context to thread: {e:?}")))
    }

    /// Copy one element from the device and wait for it
    ///
    /// # Safety
    ///
    /// `src` must be a device address and `dst` a host address of one `T`.
    unsafe fn copy_scalar_to_host<T>(&self, src: u64, dst: *mut T) -> Result<()> {
        // SAFETY: forwarded to the caller
        let result = unsafe {
            sys::cuMemcpyDtoHAsync_v2(
                dst as *mut c_void,
                src,
                size_of::<T>(),
                self.stream.cu_stream(),
            )
        };
        if result != CUresult::CUDA_SUCCESS {
            return Err(Error::Cuda(format!("device-to-host copy failed ({result:?})")));
        }
        self.synchronize()
    }

    /// Sparse dot product, see [`Handle::doti`](crate::handle::Handle::doti).
    ///
    /// # Safety
    ///
    /// `x_val` and `x_ind` must be device addresses of `nnz` elements and `y`
    /// of every element they index. `result` is a host address in host
    /// pointer mode and a device address in device pointer mode.
    pub unsafe fn doti<T: CudaElement>(
        &self,
        nnz: usize,
        x_val: u64,
        x_ind: u64,
        y: u64,
        result: u64,
        base: IndexBase,
    ) -> Result<()> {
        log_trace(
            self.layer,
            &replace_x::<T>("sparsekit_Xdoti"),
            &[
                &nnz,
                &Addr::of(x_val as *const T),
                &Addr::of(x_ind as *const i32),
                &Addr::of(y as *const T),
                &Addr::of(result as *const T),
                &base,
            ],
        );
        check_device_ptr("x_val", x_val)?;
        check_device_ptr("x_ind", x_ind)?;
        check_device_ptr("y", y)?;
        check_device_ptr("result", result)?;
        let nnz = to_i32("nnz", nnz)?;
        if nnz == 0 {
            return Ok(());
        }

        self.bind()?;
        let scratch = self.scratch.lock();
        let workspace = scratch.typed::<T>(DOTI_PARTIALS)?;
        let (ctx, dev) = (&self.context, self.device_index);
        match self.pointer_mode {
            PointerMode::Device => unsafe {
                launch_doti::<T>(ctx, &self.stream, dev, nnz, x_val, x_ind, y, workspace, result, base.offset())
            },
            PointerMode::Host => unsafe {
                launch_doti::<T>(ctx, &self.stream, dev, nnz, x_val, x_ind, y, workspace, workspace, base.offset())?;
                self.copy_scalar_to_host(workspace, result as *mut T)
            },
        }
    }

    /// CSR row pointers and entry count of an ELL matrix, see
    /// [`Handle::ell2csr_nnz`](crate::handle::Handle::ell2csr_nnz).
    ///
    /// # Safety
    ///
    /// `ell_col_ind` must be a device address of `m * ell_width` elements and
    /// `csr_row_ptr` of `m + 1`. `csr_nnz` is a host address in host pointer
    /// mode and a device address in device pointer mode.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn ell2csr_nnz(
        &self,
        m: usize,
        n: usize,
        ell_descr: &MatDescr,
        ell_width: usize,
        ell_col_ind: u64,
        csr_descr: &MatDescr,
        csr_row_ptr: u64,
        csr_nnz: u64,
    ) -> Result<()> {
        log_trace(
            self.layer,
            "sparsekit_ell2csr_nnz",
            &[
                &m,
                &n,
                ell_descr,
                &ell_width,
                &Addr::of(ell_col_ind as *const i32),
                csr_descr,
                &Addr::of(csr_row_ptr as *const i32),
                &Addr::of(csr_nnz as *const i32),
            ],
        );
        check_device_ptr("ell_col_ind", ell_col_ind)?;
        check_device_ptr("csr_row_ptr", csr_row_ptr)?;
        check_device_ptr("csr_nnz", csr_nnz)?;
        let len = to_i32("m", m.saturating_add(1))?;
        let n_i = to_i32("n", n)?;
        let width = to_i32("ell_width", ell_width)?;
        check_general("ell_descr", ell_descr)?;
        check_general("csr_descr", csr_descr)?;

        self.bind()?;
        let scratch = self.scratch.lock();
        let (ctx, stream, dev) = (&self.context, &self.stream, self.device_index);
        let csr_base = csr_descr.base().offset();

        if is_degenerate(&[m, n, ell_width]) {
            unsafe { launch_set_array_to_value(ctx, stream, dev, len, csr_base, csr_row_ptr)? };
            return match self.pointer_mode {
                PointerMode::Device => unsafe { launch_set_array_to_value(ctx, stream, dev, 1, 0, csr_nnz) },
                PointerMode::Host => {
                    // SAFETY: host result
                    unsafe { *(csr_nnz as *mut i32) = 0 };
                    self.synchronize()
                }
            };
        }

        unsafe {
            launch_ell2csr_index_base(
                ctx,
                stream,
                dev,
                len - 1,
                n_i,
                width,
                ell_col_ind,
                ell_descr.base().offset(),
                csr_row_ptr,
                csr_base,
            )?;
        }
        match self.pointer_mode {
            PointerMode::Device => unsafe {
                launch_ell2csr_row_ptr_scan(ctx, stream, dev, len - 1, csr_row_ptr, csr_base, csr_nnz)
            },
            PointerMode::Host => unsafe {
                let slot = scratch.typed::<i32>(1)?;
                launch_ell2csr_row_ptr_scan(ctx, stream, dev, len - 1, csr_row_ptr, csr_base, slot)?;
                self.copy_scalar_to_host(slot, csr_nnz as *mut i32)
            },
        }
    }

    /// Fill CSR column indices and values from an ELL matrix, see
    /// [`Handle::ell2csr`](crate::handle::Handle::ell2csr).
    ///
    /// # Safety
    ///
    /// All addresses are device addresses: the ELL arrays of
    /// `m * ell_width` elements, `csr_row_ptr` of `m + 1` offsets from
    /// [`CudaHandle::ell2csr_nnz`] and CSR arrays of the entry count it
    /// reported.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn ell2csr<T: CudaElement>(
        &self,
        m: usize,
        n: usize,
        ell_descr: &MatDescr,
        ell_width: usize,
        ell_val: u64,
        ell_col_ind: u64,
        csr_descr: &MatDescr,
        csr_val: u64,
        csr_row_ptr: u64,
        csr_col_ind: u64,
    ) -> Result<()> {
        log_trace(
            self.layer,
            &replace_x::<T>("sparsekit_Xell2csr"),
            &[
                &m,
                &n,
                ell_descr,
                &ell_width,
                &Addr::of(ell_val as *const T),
                &Addr::of(ell_col_ind as *const i32),
                csr_descr,
                &Addr::of(csr_val as *const T),
                &Addr::of(csr_row_ptr as *const i32),
                &Addr::of(csr_col_ind as *const i32),
            ],
        );
        check_device_ptr("ell_val", ell_val)?;
        check_device_ptr("ell_col_ind", ell_col_ind)?;
        check_device_ptr("csr_val", csr_val)?;
        check_device_ptr("csr_row_ptr", csr_row_ptr)?;
        check_device_ptr("csr_col_ind", csr_col_ind)?;
        let m_i = to_i32("m", m)?;
        let n_i = to_i32("n", n)?;
        let width = to_i32("ell_width", ell_width)?;
        check_general("ell_descr", ell_descr)?;
        check_general("csr_descr", csr_descr)?;
        if is_degenerate(&[m, n, ell_width]) {
            return Ok(());
        }

        self.bind()?;
        let _serial = self.scratch.lock();
        unsafe {
            launch_ell2csr_fill::<T>(
                &self.context,
                &self.stream,
                self.device_index,
                m_i,
                n_i,
                width,
                ell_col_ind,
                ell_val,
                ell_descr.base().offset(),
                csr_row_ptr,
                csr_col_ind,
                csr_val,
                csr_descr.base().offset(),
            )
        }
    }

    /// Dense x CSC product, see [`Handle::mcscm`](crate::handle::Handle::mcscm).
    ///
    /// # Safety
    ///
    /// `A`, the CSC arrays and `C` must be device addresses covering the
    /// extents implied by the dimensions and leading dimensions. `alpha` and
    /// `beta` are host addresses in host pointer mode and device addresses in
    /// device pointer mode.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn mcscm<T: CudaElement>(
        &self,
        trans_a: Operation,
        trans_b: Operation,
        m: usize,
        n: usize,
        k: usize,
        nnz: usize,
        alpha: u64,
        a: u64,
        lda: usize,
        descr: &MatDescr,
        csc_val: u64,
        csc_col_ptr: u64,
        csc_row_ind: u64,
        beta: u64,
        c: u64,
        ldc: usize,
    ) -> Result<()> {
        log_trace(
            self.layer,
            &replace_x::<T>("sparsekit_Xmcscm"),
            &[
                &trans_a,
                &trans_b,
                &m,
                &n,
                &k,
                &nnz,
                &Addr::of(alpha as *const T),
                &Addr::of(a as *const T),
                &lda,
                descr,
                &Addr::of(csc_val as *const T),
                &Addr::of(csc_col_ptr as *const i32),
                &Addr::of(csc_row_ind as *const i32),
                &Addr::of(beta as *const T),
                &Addr::of(c as *const T),
                &ldc,
            ],
        );
        check_device_ptr("alpha", alpha)?;
        check_device_ptr("A", a)?;
        check_device_ptr("csc_val", csc_val)?;
        check_device_ptr("csc_col_ptr", csc_col_ptr)?;
        check_device_ptr("csc_row_ind", csc_row_ind)?;
        check_device_ptr("beta", beta)?;
        check_device_ptr("C", c)?;
        if trans_a != Operation::NonTranspose {
            return Err(Error::invalid_size(
                "trans_A",
                "leading dimensions are only defined for a non-transposed dense operand",
            ));
        }
        check_leading_dim("lda", lda, m)?;
        check_leading_dim("ldc", ldc, m)?;
        let ptrs = McscmPtrs {
            m: to_i32("m", m)?,
            n: to_i32("n", n)?,
            a,
            lda: to_i32("lda", lda)?,
            csc_col_ptr,
            csc_row_ind,
            csc_val,
            c,
            ldc: to_i32("ldc", ldc)?,
            base: descr.base().offset(),
        };
        to_i32("k", k)?;
        to_i32("nnz", nnz)?;
        check_general("descr", descr)?;
        if trans_b != Operation::NonTranspose {
            return Err(Error::not_implemented("transposed sparse operand"));
        }
        if is_degenerate(&[m, n, k, nnz]) {
            return Ok(());
        }

        let scalars = match self.pointer_mode {
            PointerMode::Host => {
                // SAFETY: host scalars in host pointer mode
                let (alpha, beta) = unsafe { (*(alpha as *const T), *(beta as *const T)) };
                if alpha == T::zero() && beta == T::one() {
                    return Ok(());
                }
                McscmScalars::Host { alpha, beta }
            }
            PointerMode::Device => McscmScalars::Device { alpha, beta },
        };

        self.bind()?;
        let _serial = self.scratch.lock();
        unsafe { launch_mcscmnn_kernel::<T>(&self.context, &self.stream, self.device_index, &ptrs, scalars) }
    }

    /// Unroll image patches into columns, see
    /// [`Handle::im2col`](crate::handle::Handle::im2col).
    ///
    /// # Safety
    ///
    /// `im` must be a device address of `params.im_len()` elements and `col`
    /// of `params.col_len()`.
    pub unsafe fn im2col<T: CudaElement>(
        &self,
        im: u64,
        params: &Im2colParams,
        layout: Im2colLayout,
        col: u64,
    ) -> Result<()> {
        let p = params;
        log_trace(
            self.layer,
            &replace_x::<T>("sparsekit_Xim2col"),
            &[
                &Addr::of(im as *const T),
                &p.batch,
                &p.channels,
                &p.height,
                &p.width,
                &p.kernel_h,
                &p.kernel_w,
                &p.output_h,
                &p.output_w,
                &p.pad_h,
                &p.pad_w,
                &p.stride_h,
                &p.stride_w,
                &layout,
                &Addr::of(col as *const T),
            ],
        );
        check_device_ptr("im", im)?;
        check_device_ptr("col", col)?;
        check_stride("stride_h", p.stride_h)?;
        check_stride("stride_w", p.stride_w)?;
        for (arg, v) in [
            ("batch", p.batch),
            ("channels", p.channels),
            ("height", p.height),
            ("width", p.width),
            ("kernel_h", p.kernel_h),
            ("kernel_w", p.kernel_w),
            ("output_h", p.output_h),
            ("output_w", p.output_w),
            ("pad_h", p.pad_h),
            ("pad_w", p.pad_w),
            ("stride_h", p.stride_h),
            ("stride_w", p.stride_w),
        ] {
            to_i32(arg, v)?;
        }
        if p.is_degenerate() {
            return Ok(());
        }

        self.bind()?;
        let _serial = self.scratch.lock();
        unsafe { launch_im2col::<T>(&self.context, &self.stream, self.device_index, im, p, layout, col) }
    }
}

impl fmt::Debug for CudaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaHandle")
            .field("device_index", &self.device_index)
            .field("pointer_mode", &self.pointer_mode)
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i32() {
        assert_eq!(to_i32("m", 7).unwrap(), 7);
        assert!(matches!(
            to_i32("m", i32::MAX as usize + 1),
            Err(Error::InvalidSize { arg: "m", .. })
        ));
    }

    #[test]
    fn test_null_device_ptr() {
        assert!(check_device_ptr("y", 8).is_ok());
        assert!(matches!(
            check_device_ptr("y", 0),
            Err(Error::InvalidPointer { arg: "y" })
        ));
    }
}
