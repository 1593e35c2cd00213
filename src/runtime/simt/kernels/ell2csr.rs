//! ELL to CSR conversion kernels
//!
//! Conversion is three launches on one stream:
//!
//! 1. [`EllRowCount`]: one thread per row counts its valid slots into
//!    `csr_row_ptr[row + 1]`, thread 0 of the grid seeds `csr_row_ptr[0]`
//! 2. [`RowPtrScan`]: one block turns the counts into offsets and reports the
//!    total number of entries
//! 3. [`EllToCsrFill`]: one thread per row copies its valid slots, in slot
//!    order, to the offsets computed by the scan

use super::launch::{ELL2CSR_DIM, SCAN_DIM, div_blocks, grid_extent};
use super::reduce::block_inclusive_scan;
use crate::error::Result;
use crate::runtime::simt::{BlockCtx, DeviceSlice, DeviceSliceMut, Kernel, LaunchConfig, launch_config};
use crate::sparse::{IndexBase, ell_index, ell_slot_is_valid};

/// One thread per item over `items` items
pub fn launch_ell2csr_rows(items: usize) -> Result<LaunchConfig> {
    let grid = grid_extent("ell2csr", div_blocks(items, ELL2CSR_DIM))?;
    Ok(launch_config(grid, ELL2CSR_DIM, 0))
}

/// The single block of the row pointer scan
pub fn launch_row_ptr_scan() -> LaunchConfig {
    launch_config(1, SCAN_DIM, 0)
}

#[inline]
fn global_id(ctx: &BlockCtx, tid: u32) -> usize {
    ctx.block_idx().x as usize * ctx.block_dim().x as usize + tid as usize
}

/// Count the valid slots of every row
pub struct EllRowCount<'a> {
    pub(crate) m: usize,
    pub(crate) n: usize,
    pub(crate) ell_width: usize,
    pub(crate) ell_col_ind: DeviceSlice<'a, i32>,
    pub(crate) ell_base: IndexBase,
    pub(crate) csr_row_ptr: DeviceSliceMut<'a, i32>,
    pub(crate) csr_base: IndexBase,
}

impl Kernel for EllRowCount<'_> {
    const NAME: &'static str = "ell2csr_index_base";

    fn run_block(&self, ctx: &BlockCtx) {
        ctx.threads(|tid| {
            let row = global_id(ctx, tid);
            if row == 0 {
                // SAFETY: element 0 is written by global thread 0 only
                unsafe { self.csr_row_ptr.store(0, self.csr_base.offset()) };
            }
            if row >= self.m {
                return;
            }
            let count = (0..self.ell_width)
                .filter(|&p| {
                    let col = self.ell_col_ind.load(ell_index(row, p, self.m));
                    ell_slot_is_valid(col, self.ell_base, self.n)
                })
                .count();
            // SAFETY: element row + 1 belongs to this row's thread
            unsafe { self.csr_row_ptr.store(row + 1, count as i32) };
        });
    }
}

/// Inclusive scan of `csr_row_ptr[1..=m]` on top of `csr_row_ptr[0]`
///
/// Runs as one block that walks the array in chunks of its own size, carrying
/// the running total between chunks. Writes the entry count
/// `csr_row_ptr[m] - base` to `nnz[0]`.
pub struct RowPtrScan<'a> {
    pub(crate) m: usize,
    pub(crate) csr_row_ptr: DeviceSliceMut<'a, i32>,
    pub(crate) csr_base: IndexBase,
    pub(crate) nnz: DeviceSliceMut<'a, i32>,
}

impl Kernel for RowPtrScan<'_> {
    const NAME: &'static str = "ell2csr_row_ptr_scan";

    fn run_block(&self, ctx: &BlockCtx) {
        let block = ctx.block_dim().x as usize;
        let base = self.csr_base.offset();
        let mut sdata = ctx.shared::<i32>(block);
        let mut carry = base;

        let mut start = 1;
        while start <= self.m {
            ctx.threads(|tid| {
                let idx = start + tid as usize;
                sdata[tid as usize] = if idx <= self.m {
                    // SAFETY: each thread reads its own element
                    unsafe { self.csr_row_ptr.load(idx) }
                } else {
                    0
                };
            });

            block_inclusive_scan(ctx, &mut sdata);

            ctx.threads(|tid| {
                let idx = start + tid as usize;
                if idx <= self.m {
                    // SAFETY: each thread writes back the element it read
                    unsafe { self.csr_row_ptr.store(idx, sdata[tid as usize] + carry) };
                }
            });
            carry += sdata[block - 1];
            start += block;
        }

        ctx.threads(|tid| {
            if tid == 0 {
                // SAFETY: a single thread writes the count
                unsafe { self.nnz.store(0, carry - base) };
            }
        });
    }
}

/// Set `len` elements of `out` to `value`
pub struct RowPtrFill<'a> {
    pub(crate) len: usize,
    pub(crate) value: i32,
    pub(crate) out: DeviceSliceMut<'a, i32>,
}

impl Kernel for RowPtrFill<'_> {
    const NAME: &'static str = "set_array_to_value";

    fn run_block(&self, ctx: &BlockCtx) {
        ctx.threads(|tid| {
            let i = global_id(ctx, tid);
            if i < self.len {
                // SAFETY: one element per thread
                unsafe { self.out.store(i, self.value) };
            }
        });
    }
}

/// Copy valid ELL slots into CSR storage
pub struct EllToCsrFill<'a, T> {
    pub(crate) m: usize,
    pub(crate) n: usize,
    pub(crate) ell_width: usize,
    pub(crate) ell_col_ind: DeviceSlice<'a, i32>,
    pub(crate) ell_val: DeviceSlice<'a, T>,
    pub(crate) ell_base: IndexBase,
    pub(crate) csr_row_ptr: DeviceSlice<'a, i32>,
    pub(crate) csr_col_ind: DeviceSliceMut<'a, i32>,
    pub(crate) csr_val: DeviceSliceMut<'a, T>,
    pub(crate) csr_base: IndexBase,
}

impl<T: Copy + Send + Sync> Kernel for EllToCsrFill<'_, T> {
    const NAME: &'static str = "ell2csr_fill";

    fn run_block(&self, ctx: &BlockCtx) {
        let ell_base = self.ell_base.offset();
        let csr_base = self.csr_base.offset();

        ctx.threads(|tid| {
            let row = global_id(ctx, tid);
            if row >= self.m {
                return;
            }
            let mut csr_idx = (self.csr_row_ptr.load(row) - csr_base) as usize;
            for p in 0..self.ell_width {
                let ell_idx = ell_index(row, p, self.m);
                let col = self.ell_col_ind.load(ell_idx);
                if ell_slot_is_valid(col, self.ell_base, self.n) {
                    // SAFETY: [row_ptr[row], row_ptr[row + 1]) belongs to this row
                    unsafe {
                        self.csr_col_ind.store(csr_idx, col - ell_base + csr_base);
                        self.csr_val.store(csr_idx, self.ell_val.load(ell_idx));
                    }
                    csr_idx += 1;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::simt::Stream;
    use crate::sparse::ELL_PADDING;

    // 3 x 4, width 2, zero-based
    // row 0: (0, 1.0) (3, 2.0)
    // row 1: (2, 3.0) pad
    // row 2: pad      pad
    const M: usize = 3;
    const N: usize = 4;
    const W: usize = 2;

    fn ell() -> (Vec<i32>, Vec<f32>) {
        let col = vec![0, 2, ELL_PADDING, 3, ELL_PADDING, ELL_PADDING];
        let val = vec![1.0, 3.0, 0.0, 2.0, 0.0, 0.0];
        (col, val)
    }

    #[test]
    fn test_count_and_scan() {
        let stream = Stream::new();
        let (col, _) = ell();
        let mut row_ptr = vec![-7i32; M + 1];
        let mut nnz = 0i32;

        stream
            .launch(
                &launch_ell2csr_rows(M).unwrap(),
                &EllRowCount {
                    m: M,
                    n: N,
                    ell_width: W,
                    ell_col_ind: DeviceSlice::new(&col),
                    ell_base: IndexBase::Zero,
                    csr_row_ptr: DeviceSliceMut::new(&mut row_ptr),
                    csr_base: IndexBase::One,
                },
            )
            .unwrap();
        assert_eq!(row_ptr, vec![1, 2, 1, 0]);

        stream
            .launch(
                &launch_row_ptr_scan(),
                &RowPtrScan {
                    m: M,
                    csr_row_ptr: DeviceSliceMut::new(&mut row_ptr),
                    csr_base: IndexBase::One,
                    nnz: DeviceSliceMut::scalar(&mut nnz),
                },
            )
            .unwrap();
        assert_eq!(row_ptr, vec![1, 3, 4, 4]);
        assert_eq!(nnz, 3);
    }

    #[test]
    fn test_scan_spans_chunks() {
        let stream = Stream::new();
        let m = 3000;
        let mut row_ptr = vec![1i32; m + 1];
        row_ptr[0] = 0;
        let mut nnz = 0i32;
        stream
            .launch(
                &launch_row_ptr_scan(),
                &RowPtrScan {
                    m,
                    csr_row_ptr: DeviceSliceMut::new(&mut row_ptr),
                    csr_base: IndexBase::Zero,
                    nnz: DeviceSliceMut::scalar(&mut nnz),
                },
            )
            .unwrap();
        assert!(row_ptr.iter().enumerate().all(|(i, &p)| p == i as i32));
        assert_eq!(nnz, m as i32);
    }

    #[test]
    fn test_fill_rebases_indices() {
        let stream = Stream::new();
        let (col, val) = ell();
        let row_ptr = vec![1, 3, 4, 4];
        let mut csr_col = vec![0i32; 3];
        let mut csr_val = vec![0.0f32; 3];
        stream
            .launch(
                &launch_ell2csr_rows(M).unwrap(),
                &EllToCsrFill {
                    m: M,
                    n: N,
                    ell_width: W,
                    ell_col_ind: DeviceSlice::new(&col),
                    ell_val: DeviceSlice::new(&val),
                    ell_base: IndexBase::Zero,
                    csr_row_ptr: DeviceSlice::new(&row_ptr),
                    csr_col_ind: DeviceSliceMut::new(&mut csr_col),
                    csr_val: DeviceSliceMut::new(&mut csr_val),
                    csr_base: IndexBase::One,
                },
            )
            .unwrap();
        assert_eq!(csr_col, vec![1, 4, 3]);
        assert_eq!(csr_val, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_row_ptr_fill() {
        let stream = Stream::new();
        let mut row_ptr = vec![9i32; 600];
        stream
            .launch(
                &launch_ell2csr_rows(row_ptr.len()).unwrap(),
                &RowPtrFill {
                    len: row_ptr.len(),
                    value: 1,
                    out: DeviceSliceMut::new(&mut row_ptr),
                },
            )
            .unwrap();
        assert!(row_ptr.iter().all(|&p| p == 1));
    }
}
