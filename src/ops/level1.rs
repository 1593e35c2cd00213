//! Sparse vector primitives.

use crate::dtype::Element;
use crate::error::Result;
use crate::handle::{Handle, PointerMode};
use crate::logging::{Addr, ScalarArg, log_bench, log_trace, replace_x};
use crate::ops::validate::check_len;
use crate::runtime::simt::kernels::doti::{
    DOTI_PARTIALS, DotiPart1, DotiPart2, launch_doti_part1, launch_doti_part2,
};
use crate::runtime::simt::{DeviceSlice, DeviceSliceMut};
use crate::sparse::IndexBase;

/// `result = sum(x_val[i] * y[x_ind[i] - base])` over `nnz` entries
///
/// `result` is a host value in host pointer mode and device memory in device
/// pointer mode. With `nnz == 0` nothing is launched and `result` is left
/// untouched.
pub(crate) fn doti_template<T: Element>(
    handle: &Handle,
    nnz: usize,
    x_val: DeviceSlice<'_, T>,
    x_ind: DeviceSlice<'_, i32>,
    y: DeviceSlice<'_, T>,
    result: DeviceSliceMut<'_, T>,
    base: IndexBase,
) -> Result<()> {
    let layer = handle.layer();
    let mode = handle.pointer_mode();
    log_trace(
        layer,
        &replace_x::<T>("sparsekit_Xdoti"),
        &[
            &nnz,
            &Addr::of(x_val.as_ptr()),
            &Addr::of(x_ind.as_ptr()),
            &Addr::of(y.as_ptr()),
            &ScalarArg::of(mode, result.as_const()),
            &base,
        ],
    );
    if mode == PointerMode::Host {
        log_bench(layer, "doti", T::DTYPE.prefix(), "--mtx <vector.mtx>");
    }

    if nnz == 0 {
        return Ok(());
    }

    let stream = handle.stream();
    let mut scratch = handle.lock_scratch();
    let workspace = DeviceSliceMut::new(scratch.typed::<T>(DOTI_PARTIALS)?);

    stream.launch(
        &launch_doti_part1(),
        &DotiPart1 {
            nnz,
            x_val,
            x_ind,
            y,
            workspace,
            base: base.offset(),
        },
    )?;

    match mode {
        PointerMode::Device => stream.launch(
            &launch_doti_part2(),
            &DotiPart2::<T, true> {
                nblocks: DOTI_PARTIALS,
                workspace: workspace.as_const(),
                result,
            },
        ),
        PointerMode::Host => {
            stream.launch(
                &launch_doti_part2(),
                &DotiPart2::<T, false> {
                    nblocks: DOTI_PARTIALS,
                    workspace: workspace.as_const(),
                    result: workspace,
                },
            )?;
            let mut value = [T::zero()];
            stream.memcpy_dtoh(workspace.as_const(), &mut value)?;
            // SAFETY: the stream is idle and the result is host memory
            unsafe { result.store(0, value[0]) };
            Ok(())
        }
    }
}

impl Handle {
    /// Sparse dot product `sum(x_val[i] * y[x_ind[i] - base])`
    ///
    /// `x_val` and `x_ind` hold the `nnz` stored entries of the sparse
    /// vector. The result is written to `result` unless there are no entries,
    /// in which case it is left untouched.
    ///
    /// # Errors
    ///
    /// - [`InvalidSize`](crate::error::Error::InvalidSize) if `x_ind` is
    ///   shorter than `x_val`
    /// - [`OutOfMemory`](crate::error::Error::OutOfMemory) if the scratch
    ///   arena cannot hold the partial sums
    /// - [`DeviceFault`](crate::error::Error::DeviceFault) if an index points
    ///   outside `y`
    pub fn doti<T: Element>(
        &self,
        x_val: &[T],
        x_ind: &[i32],
        y: &[T],
        result: &mut T,
        base: IndexBase,
    ) -> Result<()> {
        let nnz = x_val.len();
        check_len("x_ind", x_ind.len(), nnz)?;
        doti_template(
            self,
            nnz,
            DeviceSlice::new(x_val),
            DeviceSlice::new(&x_ind[..nnz]),
            DeviceSlice::new(y),
            DeviceSliceMut::scalar(result),
            base,
        )
    }
}
