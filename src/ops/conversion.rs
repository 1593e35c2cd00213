//! Format conversions: ELL to CSR and im2col.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::handle::{Handle, PointerMode};
use crate::logging::{Addr, log_bench, log_trace, replace_x};
use crate::ops::im2col_common::{Im2colLayout, Im2colParams};
use crate::ops::validate::{check_general, check_len, check_stride, is_degenerate};
use crate::runtime::simt::kernels::ell2csr::{
    EllRowCount, EllToCsrFill, RowPtrFill, RowPtrScan, launch_ell2csr_rows, launch_row_ptr_scan,
};
use crate::runtime::simt::kernels::im2col::{Im2col, Nchw, Nhwc, launch_im2col};
use crate::runtime::simt::{DeviceSlice, DeviceSliceMut};
use crate::sparse::MatDescr;

// ============================================================================
// ELL -> CSR
// ============================================================================

/// Row pointers and entry count of the CSR form of an ELL matrix
#[allow(clippy::too_many_arguments)]
pub(crate) fn ell2csr_nnz_template(
    handle: &Handle,
    m: usize,
    n: usize,
    ell_descr: &MatDescr,
    ell_width: usize,
    ell_col_ind: DeviceSlice<'_, i32>,
    csr_descr: &MatDescr,
    csr_row_ptr: DeviceSliceMut<'_, i32>,
    csr_nnz: DeviceSliceMut<'_, i32>,
) -> Result<()> {
    log_trace(
        handle.layer(),
        "sparsekit_ell2csr_nnz",
        &[
            &m,
            &n,
            ell_descr,
            &ell_width,
            &Addr::of(ell_col_ind.as_ptr()),
            csr_descr,
            &Addr::of(csr_row_ptr.as_ptr()),
            &Addr::of(csr_nnz.as_ptr()),
        ],
    );

    check_general("ell_descr", ell_descr)?;
    check_general("csr_descr", csr_descr)?;

    let stream = handle.stream();
    let mode = handle.pointer_mode();
    let csr_base = csr_descr.base();
    let mut scratch = handle.lock_scratch();

    if is_degenerate(&[m, n, ell_width]) {
        stream.launch(
            &launch_ell2csr_rows(m + 1)?,
            &RowPtrFill {
                len: m + 1,
                value: csr_base.offset(),
                out: csr_row_ptr,
            },
        )?;
        return match mode {
            PointerMode::Device => stream.launch(
                &launch_ell2csr_rows(1)?,
                &RowPtrFill {
                    len: 1,
                    value: 0,
                    out: csr_nnz,
                },
            ),
            PointerMode::Host => {
                // SAFETY: host result, stream idle
                unsafe { csr_nnz.store(0, 0) };
                Ok(())
            }
        };
    }

    stream.launch(
        &launch_ell2csr_rows(m)?,
        &EllRowCount {
            m,
            n,
            ell_width,
            ell_col_ind,
            ell_base: ell_descr.base(),
            csr_row_ptr,
            csr_base,
        },
    )?;

    match mode {
        PointerMode::Device => stream.launch(
            &launch_row_ptr_scan(),
            &RowPtrScan {
                m,
                csr_row_ptr,
                csr_base,
                nnz: csr_nnz,
            },
        ),
        PointerMode::Host => {
            let slot = DeviceSliceMut::new(scratch.typed::<i32>(1)?);
            stream.launch(
                &launch_row_ptr_scan(),
                &RowPtrScan {
                    m,
                    csr_row_ptr,
                    csr_base,
                    nnz: slot,
                },
            )?;
            let mut nnz = [0i32];
            stream.memcpy_dtoh(slot.as_const(), &mut nnz)?;
            // SAFETY: host result, stream idle
            unsafe { csr_nnz.store(0, nnz[0]) };
            Ok(())
        }
    }
}

/// Fill CSR column indices and values from an ELL matrix
#[allow(clippy::too_many_arguments)]
pub(crate) fn ell2csr_template<T: Element>(
    handle: &Handle,
    m: usize,
    n: usize,
    ell_descr: &MatDescr,
    ell_width: usize,
    ell_val: DeviceSlice<'_, T>,
    ell_col_ind: DeviceSlice<'_, i32>,
    csr_descr: &MatDescr,
    csr_val: DeviceSliceMut<'_, T>,
    csr_row_ptr: DeviceSlice<'_, i32>,
    csr_col_ind: DeviceSliceMut<'_, i32>,
) -> Result<()> {
    let layer = handle.layer();
    log_trace(
        layer,
        &replace_x::<T>("sparsekit_Xell2csr"),
        &[
            &m,
            &n,
            ell_descr,
            &ell_width,
            &Addr::of(ell_val.as_ptr()),
            &Addr::of(ell_col_ind.as_ptr()),
            csr_descr,
            &Addr::of(csr_val.as_ptr()),
            &Addr::of(csr_row_ptr.as_ptr()),
            &Addr::of(csr_col_ind.as_ptr()),
        ],
    );
    log_bench(layer, "ell2csr", T::DTYPE.prefix(), "--mtx <matrix.mtx>");

    check_general("ell_descr", ell_descr)?;
    check_general("csr_descr", csr_descr)?;

    if is_degenerate(&[m, n, ell_width]) {
        return Ok(());
    }

    let _serial = handle.lock_scratch();
    handle.stream().launch(
        &launch_ell2csr_rows(m)?,
        &EllToCsrFill {
            m,
            n,
            ell_width,
            ell_col_ind,
            ell_val,
            ell_base: ell_descr.base(),
            csr_row_ptr,
            csr_col_ind,
            csr_val,
            csr_base: csr_descr.base(),
        },
    )
}

// ============================================================================
// im2col
// ============================================================================

/// Unroll `im` into `col` for the given layout
pub(crate) fn im2col_template<T: Element>(
    handle: &Handle,
    im: DeviceSlice<'_, T>,
    params: &Im2colParams,
    layout: Im2colLayout,
    col: DeviceSliceMut<'_, T>,
) -> Result<()> {
    let p = params;
    log_trace(
        handle.layer(),
        &replace_x::<T>("sparsekit_Xim2col"),
        &[
            &Addr::of(im.as_ptr()),
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
            &Addr::of(col.as_ptr()),
        ],
    );

    check_stride("stride_h", p.stride_h)?;
    check_stride("stride_w", p.stride_w)?;

    if p.is_degenerate() {
        return Ok(());
    }

    let cfg = launch_im2col::<T>(p)?;
    let stream = handle.stream();
    let _serial = handle.lock_scratch();
    match layout {
        Im2colLayout::Nchw => stream.launch(&cfg, &Im2col::<T, Nchw>::new(*p, im, col)),
        Im2colLayout::Nhwc => stream.launch(&cfg, &Im2col::<T, Nhwc>::new(*p, im, col)),
    }
}

impl Handle {
    /// Compute the CSR row pointers of an ELL matrix and its entry count
    ///
    /// `csr_row_ptr` receives `m + 1` offsets in the base of `csr_descr`.
    /// `csr_nnz` is a host value in host pointer mode and device memory in
    /// device pointer mode.
    #[allow(clippy::too_many_arguments)]
    pub fn ell2csr_nnz(
        &self,
        m: usize,
        n: usize,
        ell_descr: &MatDescr,
        ell_width: usize,
        ell_col_ind: &[i32],
        csr_descr: &MatDescr,
        csr_row_ptr: &mut [i32],
        csr_nnz: &mut i32,
    ) -> Result<()> {
        check_len("ell_col_ind", ell_col_ind.len(), ell_len(m, ell_width)?)?;
        check_len("csr_row_ptr", csr_row_ptr.len(), m + 1)?;
        ell2csr_nnz_template(
            self,
            m,
            n,
            ell_descr,
            ell_width,
            DeviceSlice::new(ell_col_ind),
            csr_descr,
            DeviceSliceMut::new(&mut csr_row_ptr[..m + 1]),
            DeviceSliceMut::scalar(csr_nnz),
        )
    }

    /// Convert an ELL matrix to CSR
    ///
    /// `csr_row_ptr` must come from [`Handle::ell2csr_nnz`] with the same
    /// descriptors; `csr_val` and `csr_col_ind` must hold the entry count it
    /// reported.
    #[allow(clippy::too_many_arguments)]
    pub fn ell2csr<T: Element>(
        &self,
        m: usize,
        n: usize,
        ell_descr: &MatDescr,
        ell_width: usize,
        ell_val: &[T],
        ell_col_ind: &[i32],
        csr_descr: &MatDescr,
        csr_val: &mut [T],
        csr_row_ptr: &[i32],
        csr_col_ind: &mut [i32],
    ) -> Result<()> {
        let ell_len = ell_len(m, ell_width)?;
        check_len("ell_val", ell_val.len(), ell_len)?;
        check_len("ell_col_ind", ell_col_ind.len(), ell_len)?;
        check_len("csr_row_ptr", csr_row_ptr.len(), m + 1)?;
        let nnz = csr_row_ptr[m]
            .checked_sub(csr_descr.base().offset())
            .and_then(|nnz| usize::try_from(nnz).ok())
            .ok_or_else(|| Error::invalid_value("csr_row_ptr", "last offset precedes the index base"))?;
        check_len("csr_val", csr_val.len(), nnz)?;
        check_len("csr_col_ind", csr_col_ind.len(), nnz)?;
        ell2csr_template(
            self,
            m,
            n,
            ell_descr,
            ell_width,
            DeviceSlice::new(ell_val),
            DeviceSlice::new(ell_col_ind),
            csr_descr,
            DeviceSliceMut::new(csr_val),
            DeviceSlice::new(csr_row_ptr),
            DeviceSliceMut::new(csr_col_ind),
        )
    }

    /// Unroll image patches into a column matrix
    ///
    /// `im` holds `params.im_len()` elements and `col` receives
    /// `params.col_len()` elements, both in `layout`.
    pub fn im2col<T: Element>(
        &self,
        im: &[T],
        params: &Im2colParams,
        layout: Im2colLayout,
        col: &mut [T],
    ) -> Result<()> {
        check_len("im", im.len(), params.im_len())?;
        check_len("col", col.len(), params.col_len())?;
        im2col_template(
            self,
            DeviceSlice::new(im),
            params,
            layout,
            DeviceSliceMut::new(col),
        )
    }
}

fn ell_len(m: usize, ell_width: usize) -> Result<usize> {
    m.checked_mul(ell_width)
        .ok_or_else(|| Error::invalid_size("ell_width", format!("{m} x {ell_width} slots overflow")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sparse::{IndexBase, MatrixType};

    #[test]
    fn test_degenerate_width_fills_base() {
        let handle = Handle::with_config(Config::default()).unwrap();
        let descr = MatDescr::new().with_base(IndexBase::One);
        let mut row_ptr = [7i32; 4];
        let mut nnz = -1;
        handle
            .ell2csr_nnz(3, 5, &MatDescr::new(), 0, &[], &descr, &mut row_ptr, &mut nnz)
            .unwrap();
        assert_eq!(row_ptr, [1, 1, 1, 1]);
        assert_eq!(nnz, 0);
    }

    #[test]
    fn test_non_general_rejected() {
        let handle = Handle::with_config(Config::default()).unwrap();
        let sym = MatDescr::new().with_type(MatrixType::Symmetric);
        let mut row_ptr = [0i32; 2];
        let mut nnz = 0;
        let err = handle
            .ell2csr_nnz(1, 1, &sym, 1, &[0], &MatDescr::new(), &mut row_ptr, &mut nnz)
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented { .. }));
        assert_eq!(handle.stream().launch_count(), 0);
    }

    #[test]
    fn test_row_ptr_below_base() {
        let handle = Handle::with_config(Config::default()).unwrap();
        let csr_descr = MatDescr::new().with_base(IndexBase::One);
        for last in [0, i32::MIN] {
            let err = handle
                .ell2csr::<f64>(
                    1,
                    1,
                    &MatDescr::new(),
                    1,
                    &[1.0],
                    &[0],
                    &csr_descr,
                    &mut [],
                    &[1, last],
                    &mut [],
                )
                .unwrap_err();
            assert!(matches!(err, Error::InvalidValue { arg: "csr_row_ptr", .. }), "{last}");
        }
        assert_eq!(handle.stream().launch_count(), 0);
    }

    #[test]
    fn test_im2col_zero_stride() {
        let handle = Handle::with_config(Config::default()).unwrap();
        let p = Im2colParams::new(1, 1, 2, 2, (1, 1), (0, 0), (1, 1));
        let p = Im2colParams { stride_w: 0, ..p };
        let mut col = [0.0f32; 4];
        let err = handle
            .im2col(&[1.0f32; 4], &p, Im2colLayout::Nchw, &mut col)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSize { arg: "stride_w", .. }));
    }
}
