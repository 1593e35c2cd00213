//! C ABI
//!
//! Every function returns a [`Status`]. Arguments are checked in the order
//! documented in [`ops::validate`](crate::ops::validate): handle, null
//! pointers, enumerated values, then sizes. No panic crosses the boundary;
//! one that escapes a call is reported as [`Status::InternalError`].
//!
//! Handles and matrix descriptors are opaque: C code only ever holds the
//! pointers returned by the `create` functions and must release them with the
//! matching `destroy` function.
//!
//! Buffer arguments point to memory the caller owns for the duration of the
//! call. Extents follow from the size arguments exactly as in the safe API;
//! `y`, `csr_val` and `csr_col_ind` are only bounded by the indices they are
//! accessed with.

// Handle and MatDescr are opaque to C.
#![allow(improper_ctypes_definitions)]

use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};

use crate::dtype::Element;
use crate::error::{Error, Result, Status};
use crate::handle::{Handle, PointerMode};
use crate::ops::validate::{check_non_negative, check_not_null, dense_len};
use crate::ops::{
    Im2colLayout, Im2colParams, doti_template, ell2csr_nnz_template, ell2csr_template,
    im2col_template, mcscm_template,
};
use crate::runtime::simt::{DeviceSlice, DeviceSliceMut};
use crate::sparse::{IndexBase, MatDescr, MatrixType, Operation};

/// Run the body of an entry point and flatten its outcome into a status
fn guard(entry: &'static str, body: impl FnOnce() -> Result<()>) -> Status {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Status::Success,
        Ok(Err(e)) => {
            debug!("{entry}: {e}");
            e.status()
        }
        Err(_) => {
            error!("{entry}: panic caught at the C boundary");
            Status::InternalError
        }
    }
}

/// # Safety
///
/// `handle` is null or was returned by [`sparsekit_create_handle`] and not
/// yet destroyed.
unsafe fn handle_ref<'a>(handle: *const Handle) -> Result<&'a Handle> {
    // SAFETY: forwarded to the caller
    unsafe { handle.as_ref() }.ok_or(Error::InvalidHandle)
}

/// # Safety
///
/// `descr` is null or was returned by [`sparsekit_create_mat_descr`] and not
/// yet destroyed.
unsafe fn descr_ref<'a>(arg: &'static str, descr: *const MatDescr) -> Result<&'a MatDescr> {
    // SAFETY: forwarded to the caller
    unsafe { descr.as_ref() }.ok_or(Error::invalid_pointer(arg))
}

// ============================================================================
// Handle and descriptor lifecycle
// ============================================================================

/// Create a handle configured from the environment.
///
/// # Safety
///
/// `handle` must be null or valid for a pointer-sized write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_create_handle(handle: *mut *mut Handle) -> Status {
    guard("sparsekit_create_handle", || {
        check_not_null("handle", handle)?;
        let created = Box::new(Handle::new()?);
        // SAFETY: checked non-null above
        unsafe { *handle = Box::into_raw(created) };
        Ok(())
    })
}

/// Destroy a handle.
///
/// # Safety
///
/// `handle` must be null or a live handle; it is dangling afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_destroy_handle(handle: *mut Handle) -> Status {
    guard("sparsekit_destroy_handle", || {
        if handle.is_null() {
            return Err(Error::InvalidHandle);
        }
        // SAFETY: created by Box::into_raw in sparsekit_create_handle
        drop(unsafe { Box::from_raw(handle) });
        Ok(())
    })
}

/// Select host (0) or device (1) pointer mode.
///
/// # Safety
///
/// `handle` must be null or a live handle not used concurrently.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_set_pointer_mode(handle: *mut Handle, mode: i32) -> Status {
    guard("sparsekit_set_pointer_mode", || {
        // SAFETY: forwarded to the caller
        let handle = unsafe { handle.as_mut() }.ok_or(Error::InvalidHandle)?;
        handle.set_pointer_mode(PointerMode::try_from(mode)?);
        Ok(())
    })
}

/// Read the pointer mode of a handle.
///
/// # Safety
///
/// `handle` must be null or a live handle; `mode` must be null or valid for
/// a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_get_pointer_mode(handle: *const Handle, mode: *mut i32) -> Status {
    guard("sparsekit_get_pointer_mode", || {
        // SAFETY: forwarded to the caller
        let handle = unsafe { handle_ref(handle) }?;
        check_not_null("mode", mode)?;
        // SAFETY: checked non-null above
        unsafe { *mode = handle.pointer_mode() as i32 };
        Ok(())
    })
}

/// Create a general, zero-based matrix descriptor.
///
/// # Safety
///
/// `descr` must be null or valid for a pointer-sized write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_create_mat_descr(descr: *mut *mut MatDescr) -> Status {
    guard("sparsekit_create_mat_descr", || {
        check_not_null("descr", descr)?;
        // SAFETY: checked non-null above
        unsafe { *descr = Box::into_raw(Box::new(MatDescr::new())) };
        Ok(())
    })
}

/// Destroy a matrix descriptor.
///
/// # Safety
///
/// `descr` must be null or a live descriptor; it is dangling afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_destroy_mat_descr(descr: *mut MatDescr) -> Status {
    guard("sparsekit_destroy_mat_descr", || {
        check_not_null("descr", descr)?;
        // SAFETY: created by Box::into_raw in sparsekit_create_mat_descr
        drop(unsafe { Box::from_raw(descr) });
        Ok(())
    })
}

/// Set the index base (0 or 1) of a descriptor.
///
/// # Safety
///
/// `descr` must be null or a live descriptor not used concurrently.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_set_mat_index_base(descr: *mut MatDescr, base: i32) -> Status {
    guard("sparsekit_set_mat_index_base", || {
        // SAFETY: forwarded to the caller
        let descr = unsafe { descr.as_mut() }.ok_or(Error::invalid_pointer("descr"))?;
        descr.set_base(IndexBase::try_from(base)?);
        Ok(())
    })
}

/// Set the matrix type of a descriptor.
///
/// # Safety
///
/// `descr` must be null or a live descriptor not used concurrently.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sparsekit_set_mat_type(descr: *mut MatDescr, matrix_type: i32) -> Status {
    guard("sparsekit_set_mat_type", || {
        // SAFETY: forwarded to the caller
        let descr = unsafe { descr.as_mut() }.ok_or(Error::invalid_pointer("descr"))?;
        descr.set_type(MatrixType::try_from(matrix_type)?);
        Ok(())
    })
}

// ============================================================================
// Primitives
// ============================================================================

#[allow(clippy::too_many_arguments)]
unsafe fn doti_raw<T: Element>(
    handle: *const Handle,
    nnz: i32,
    x_val: *const T,
    x_ind: *const i32,
    y: *const T,
    result: *mut T,
    idx_base: i32,
) -> Result<()> {
    // SAFETY: forwarded to the caller
    let handle = unsafe { handle_ref(handle) }?;
    check_not_null("x_val", x_val)?;
    check_not_null("x_ind", x_ind)?;
    check_not_null("y", y)?;
    check_not_null("result", result)?;
    let base = IndexBase::try_from(idx_base)?;
    let nnz = check_non_negative("nnz", nnz)?;

    // SAFETY: extents follow from nnz; y is bounded by the caller's indices
    unsafe {
        doti_template(
            handle,
            nnz,
            DeviceSlice::from_raw_parts(x_val, nnz),
            DeviceSlice::from_raw_parts(x_ind, nnz),
            DeviceSlice::from_raw_unbounded(y),
            DeviceSliceMut::from_raw_parts(result, 1),
            base,
        )
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn ell2csr_raw<T: Element>(
    handle: *const Handle,
    m: i32,
    n: i32,
    ell_descr: *const MatDescr,
    ell_width: i32,
    ell_val: *const T,
    ell_col_ind: *const i32,
    csr_descr: *const MatDescr,
    csr_val: *mut T,
    csr_row_ptr: *const i32,
    csr_col_ind: *mut i32,
) -> Result<()> {
    // SAFETY: forwarded to the caller
    let handle = unsafe { handle_ref(handle) }?;
    // SAFETY: forwarded to the caller
    let ell_descr = unsafe { descr_ref("ell_descr", ell_descr) }?;
    check_not_null("ell_val", ell_val)?;
    check_not_null("ell_col_ind", ell_col_ind)?;
    // SAFETY: forwarded to the caller
    let csr_descr = unsafe { descr_ref("csr_descr", csr_descr) }?;
    check_not_null("csr_val", csr_val)?;
    check_not_null("csr_row_ptr", csr_row_ptr)?;
    check_not_null("csr_col_ind", csr_col_ind)?;
    let m = check_non_negative("m", m)?;
    let n = check_non_negative("n", n)?;
    let ell_width = check_non_negative("ell_width", ell_width)?;

    let ell_len = m * ell_width;
    // SAFETY: ELL and row pointer extents follow from m and ell_width; the
    // CSR outputs are bounded by the row pointers
    unsafe {
        ell2csr_template(
            handle,
            m,
            n,
            ell_descr,
            ell_width,
            DeviceSlice::from_raw_parts(ell_val, ell_len),
            DeviceSlice::from_raw_parts(ell_col_ind, ell_len),
            csr_descr,
            DeviceSliceMut::from_raw_unbounded(csr_val),
            DeviceSlice::from_raw_parts(csr_row_ptr, m + 1),
            DeviceSliceMut::from_raw_unbounded(csr_col_ind),
        )
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn mcscm_raw<T: Element>(
    handle: *const Handle,
    trans_a: i32,
    trans_b: i32,
    m: i32,
    n: i32,
    k: i32,
    nnz: i32,
    alpha: *const T,
    a: *const T,
    lda: i32,
    descr: *const MatDescr,
    csc_val: *const T,
    csc_col_ptr: *const i32,
    csc_row_ind: *const i32,
    beta: *const T,
    c: *mut T,
    ldc: i32,
) -> Result<()> {
    // SAFETY: forwarded to the caller
    let handle = unsafe { handle_ref(handle) }?;
    check_not_null("alpha", alpha)?;
    check_not_null("A", a)?;
    // SAFETY: forwarded to the caller
    let descr = unsafe { descr_ref("descr", descr) }?;
    check_not_null("csc_val", csc_val)?;
    check_not_null("csc_col_ptr", csc_col_ptr)?;
    check_not_null("csc_row_ind", csc_row_ind)?;
    check_not_null("beta", beta)?;
    check_not_null("C", c)?;
    let trans_a = Operation::try_from(trans_a)?;
    let trans_b = Operation::try_from(trans_b)?;
    let m = check_non_negative("m", m)?;
    let n = check_non_negative("n", n)?;
    let k = check_non_negative("k", k)?;
    let nnz = check_non_negative("nnz", nnz)?;
    let lda = check_non_negative("lda", lda)?;
    let ldc = check_non_negative("ldc", ldc)?;

    // SAFETY: extents follow from the dimensions and leading dimensions
    unsafe {
        mcscm_template(
            handle,
            trans_a,
            trans_b,
            m,
            n,
            k,
            nnz,
            DeviceSlice::from_raw_parts(alpha, 1),
            DeviceSlice::from_raw_parts(a, dense_len(lda, m, k)),
            lda,
            descr,
            DeviceSlice::from_raw_parts(csc_val, nnz),
            DeviceSlice::from_raw_parts(csc_col_ptr, n + 1),
            DeviceSlice::from_raw_parts(csc_row_ind, nnz),
            DeviceSlice::from_raw_parts(beta, 1),
            DeviceSliceMut::from_raw_parts(c, dense_len(ldc, m, n)),
            ldc,
        )
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn im2col_raw<T: Element>(
    handle: *const Handle,
    im: *const T,
    batch: i32,
    channels: i32,
    height: i32,
    width: i32,
    kernel_h: i32,
    kernel_w: i32,
    output_h: i32,
    output_w: i32,
    pad_h: i32,
    pad_w: i32,
    stride_h: i32,
    stride_w: i32,
    layout: i32,
    col: *mut T,
) -> Result<()> {
    // SAFETY: forwarded to the caller
    let handle = unsafe { handle_ref(handle) }?;
    check_not_null("im", im)?;
    check_not_null("col", col)?;
    let layout = Im2colLayout::try_from(layout)?;
    let params = Im2colParams {
        batch: check_non_negative("batch", batch)?,
        channels: check_non_negative("channels", channels)?,
        height: check_non_negative("height", height)?,
        width: check_non_negative("width", width)?,
        kernel_h: check_non_negative("kernel_h", kernel_h)?,
        kernel_w: check_non_negative("kernel_w", kernel_w)?,
        output_h: check_non_negative("output_h", output_h)?,
        output_w: check_non_negative("output_w", output_w)?,
        pad_h: check_non_negative("pad_h", pad_h)?,
        pad_w: check_non_negative("pad_w", pad_w)?,
        stride_h: check_non_negative("stride_h", stride_h)?,
        stride_w: check_non_negative("stride_w", stride_w)?,
    };

    // SAFETY: extents follow from the geometry
    unsafe {
        im2col_template(
            handle,
            DeviceSlice::from_raw_parts(im, params.im_len()),
            &params,
            layout,
            DeviceSliceMut::from_raw_parts(col, params.col_len()),
        )
    }
}

macro_rules! doti_entry {
    ($name:ident, $t:ty) => {
        #[doc = concat!("Sparse dot product on `", stringify!($t), "`; see [`Handle::doti`].")]
        ///
        /// # Safety
        ///
        /// `handle` must be null or live. `x_val` and `x_ind` must hold `nnz`
        /// elements, `y` every element they index, and `result` one element
        /// in the memory space selected by the pointer mode.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(
            handle: *const Handle,
            nnz: i32,
            x_val: *const $t,
            x_ind: *const i32,
            y: *const $t,
            result: *mut $t,
            idx_base: i32,
        ) -> Status {
            guard(stringify!($name), || {
                // SAFETY: forwarded to the caller
                unsafe { doti_raw(handle, nnz, x_val, x_ind, y, result, idx_base) }
            })
        }
    };
}

doti_entry!(sparsekit_sdoti, f32);
doti_entry!(sparsekit_ddoti, f64);

/// Row pointers and entry count of the CSR form of an ELL matrix; see
/// [`Handle::ell2csr_nnz`].
///
/// # Safety
///
/// `handle` and both descriptors must be null or live. `ell_col_ind` must
/// hold `m * ell_width` elements, `csr_row_ptr` `m + 1`, and `csr_nnz` one
/// element in the memory space selected by the pointer mode.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn sparsekit_ell2csr_nnz(
    handle: *const Handle,
    m: i32,
    n: i32,
    ell_descr: *const MatDescr,
    ell_width: i32,
    ell_col_ind: *const i32,
    csr_descr: *const MatDescr,
    csr_row_ptr: *mut i32,
    csr_nnz: *mut i32,
) -> Status {
    guard("sparsekit_ell2csr_nnz", || {
        // SAFETY: forwarded to the caller
        let handle = unsafe { handle_ref(handle) }?;
        // SAFETY: forwarded to the caller
        let ell_descr = unsafe { descr_ref("ell_descr", ell_descr) }?;
        check_not_null("ell_col_ind", ell_col_ind)?;
        // SAFETY: forwarded to the caller
        let csr_descr = unsafe { descr_ref("csr_descr", csr_descr) }?;
        check_not_null("csr_row_ptr", csr_row_ptr)?;
        check_not_null("csr_nnz", csr_nnz)?;
        let m = check_non_negative("m", m)?;
        let n = check_non_negative("n", n)?;
        let ell_width = check_non_negative("ell_width", ell_width)?;

        // SAFETY: extents follow from m and ell_width
        unsafe {
            ell2csr_nnz_template(
                handle,
                m,
                n,
                ell_descr,
                ell_width,
                DeviceSlice::from_raw_parts(ell_col_ind, m * ell_width),
                csr_descr,
                DeviceSliceMut::from_raw_parts(csr_row_ptr, m + 1),
                DeviceSliceMut::from_raw_parts(csr_nnz, 1),
            )
        }
    })
}

macro_rules! ell2csr_entry {
    ($name:ident, $t:ty) => {
        #[doc = concat!("ELL to CSR conversion on `", stringify!($t), "`; see [`Handle::ell2csr`].")]
        ///
        /// # Safety
        ///
        /// `handle` and both descriptors must be null or live. The ELL arrays
        /// must hold `m * ell_width` elements, `csr_row_ptr` the `m + 1`
        /// offsets from `sparsekit_ell2csr_nnz`, and the CSR arrays the entry
        /// count they describe.
        #[unsafe(no_mangle)]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            handle: *const Handle,
            m: i32,
            n: i32,
            ell_descr: *const MatDescr,
            ell_width: i32,
            ell_val: *const $t,
            ell_col_ind: *const i32,
            csr_descr: *const MatDescr,
            csr_val: *mut $t,
            csr_row_ptr: *const i32,
            csr_col_ind: *mut i32,
        ) -> Status {
            guard(stringify!($name), || {
                // SAFETY: forwarded to the caller
                unsafe {
                    ell2csr_raw(
                        handle,
                        m,
                        n,
                        ell_descr,
                        ell_width,
                        ell_val,
                        ell_col_ind,
                        csr_descr,
                        csr_val,
                        csr_row_ptr,
                        csr_col_ind,
                    )
                }
            })
        }
    };
}

ell2csr_entry!(sparsekit_sell2csr, f32);
ell2csr_entry!(sparsekit_dell2csr, f64);

macro_rules! mcscm_entry {
    ($name:ident, $t:ty) => {
        #[doc = concat!("Dense x CSC product on `", stringify!($t), "`; see [`Handle::mcscm`].")]
        ///
        /// `trans_a` and `trans_b` take the operation codes 111, 112 and 113.
        ///
        /// # Safety
        ///
        /// `handle` and `descr` must be null or live. Buffers must cover the
        /// extents given by the dimensions and leading dimensions; `alpha`
        /// and `beta` live in the memory space selected by the pointer mode.
        #[unsafe(no_mangle)]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            handle: *const Handle,
            trans_a: i32,
            trans_b: i32,
            m: i32,
            n: i32,
            k: i32,
            nnz: i32,
            alpha: *const $t,
            a: *const $t,
            lda: i32,
            descr: *const MatDescr,
            csc_val: *const $t,
            csc_col_ptr: *const i32,
            csc_row_ind: *const i32,
            beta: *const $t,
            c: *mut $t,
            ldc: i32,
        ) -> Status {
            guard(stringify!($name), || {
                // SAFETY: forwarded to the caller
                unsafe {
                    mcscm_raw(
                        handle,
                        trans_a,
                        trans_b,
                        m,
                        n,
                        k,
                        nnz,
                        alpha,
                        a,
                        lda,
                        descr,
                        csc_val,
                        csc_col_ptr,
                        csc_row_ind,
                        beta,
                        c,
                        ldc,
                    )
                }
            })
        }
    };
}

mcscm_entry!(sparsekit_smcscm, f32);
mcscm_entry!(sparsekit_dmcscm, f64);

macro_rules! im2col_entry {
    ($name:ident, $t:ty) => {
        #[doc = concat!("im2col on `", stringify!($t), "`; see [`Handle::im2col`].")]
        ///
        /// `layout` is 0 for NCHW and 1 for NHWC.
        ///
        /// # Safety
        ///
        /// `handle` must be null or live; `im` and `col` must cover the
        /// extents given by the geometry.
        #[unsafe(no_mangle)]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            handle: *const Handle,
            im: *const $t,
            batch: i32,
            channels: i32,
            height: i32,
            width: i32,
            kernel_h: i32,
            kernel_w: i32,
            output_h: i32,
            output_w: i32,
            pad_h: i32,
            pad_w: i32,
            stride_h: i32,
            stride_w: i32,
            layout: i32,
            col: *mut $t,
        ) -> Status {
            guard(stringify!($name), || {
                // SAFETY: forwarded to the caller
                unsafe {
                    im2col_raw(
                        handle, im, batch, channels, height, width, kernel_h, kernel_w,
                        output_h, output_w, pad_h, pad_w, stride_h, stride_w, layout, col,
                    )
                }
            })
        }
    };
}

im2col_entry!(sparsekit_sim2col, f32);
im2col_entry!(sparsekit_dim2col, f64);
