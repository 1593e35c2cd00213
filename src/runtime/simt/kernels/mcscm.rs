//! Dense x CSC product kernels
//!
//! `C = alpha * A * B + beta * C` with `A` dense `m x k`, `B` sparse `k x n`
//! in CSC and `C` dense `m x n`, all column-major.
//!
//! Blocks of [`MCSCMNN_DIM`] threads are split into lane groups of
//! [`MCSCM_SUB_WF_SIZE`] lanes. Grid `y` tiles the rows of `C` in groups of
//! W, striding by the grid extent once `m` exceeds the y limit; grid `x` hands one column of `C` to each lane group, striding by the
//! number of lane groups in the grid. A lane group streams its column of `B`
//! through shared memory W entries at a time and lane `l` accumulates row
//! `l` of the tile.

use super::launch::{MCSCM_SUB_WF_SIZE, MCSCMNN_DIM, grid_extent, grid_extent_yz};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::simt::{BlockCtx, DeviceSlice, DeviceSliceMut, Kernel, LaunchConfig, launch_config};
use crate::sparse::IndexBase;

const WF: usize = MCSCM_SUB_WF_SIZE as usize;

/// Grid `(ceil(W * n / DIM), min(ceil(m / W), 65535))`
///
/// Blocks stride over row groups past the y limit.
pub fn launch_mcscmnn(m: usize, n: usize) -> Result<LaunchConfig> {
    if m == 0 || n == 0 {
        return Err(Error::launch("mcscmnn", format!("empty product {m} x {n}")));
    }
    let w = MCSCM_SUB_WF_SIZE as u64;
    let gx = grid_extent("mcscmnn", (w * n as u64).div_ceil(MCSCMNN_DIM as u64))?;
    let gy = grid_extent_yz((m as u64).div_ceil(w));
    Ok(launch_config((gx, gy, 1), MCSCMNN_DIM, 0))
}

/// Operands shared by the host and device pointer kernels
pub struct McscmArgs<'a, T> {
    pub(crate) m: usize,
    pub(crate) n: usize,
    pub(crate) a: DeviceSlice<'a, T>,
    pub(crate) lda: usize,
    pub(crate) csc_col_ptr: DeviceSlice<'a, i32>,
    pub(crate) csc_row_ind: DeviceSlice<'a, i32>,
    pub(crate) csc_val: DeviceSlice<'a, T>,
    pub(crate) c: DeviceSliceMut<'a, T>,
    pub(crate) ldc: usize,
    pub(crate) base: IndexBase,
}

/// Scalars passed by value
pub struct McscmnnHost<'a, T> {
    pub(crate) args: McscmArgs<'a, T>,
    pub(crate) alpha: T,
    pub(crate) beta: T,
}

/// Scalars read from device memory by every block
pub struct McscmnnDevice<'a, T> {
    pub(crate) args: McscmArgs<'a, T>,
    pub(crate) alpha: DeviceSlice<'a, T>,
    pub(crate) beta: DeviceSlice<'a, T>,
}

impl<T: Element> Kernel for McscmnnHost<'_, T> {
    const NAME: &'static str = "mcscmnn_kernel_host_pointer";

    fn run_block(&self, ctx: &BlockCtx) {
        mcscmnn_general_device(ctx, &self.args, self.alpha, self.beta);
    }
}

impl<T: Element> Kernel for McscmnnDevice<'_, T> {
    const NAME: &'static str = "mcscmnn_kernel_device_pointer";

    fn run_block(&self, ctx: &BlockCtx) {
        let alpha = self.alpha.load(0);
        let beta = self.beta.load(0);
        if alpha == T::zero() && beta == T::one() {
            return;
        }
        mcscmnn_general_device(ctx, &self.args, alpha, beta);
    }
}

fn mcscmnn_general_device<T: Element>(ctx: &BlockCtx, args: &McscmArgs<'_, T>, alpha: T, beta: T) {
    let block = ctx.block_dim().x as usize;
    let bx = ctx.block_idx().x as usize;
    let nwf = ctx.grid_dim().x as usize * block / WF;
    let grid_y = ctx.grid_dim().y as usize;

    let mut shared_row = ctx.shared::<i32>(block);
    let mut shared_val = ctx.shared::<T>(block);

    let mut by = ctx.block_idx().y as usize;
    while by * WF < args.m {
        row_group(args, by, bx, block, nwf, &mut shared_row, &mut shared_val, alpha, beta);
        by += grid_y;
    }
}

/// Rows `by * W .. (by + 1) * W` of every column owned by block `bx`
#[allow(clippy::too_many_arguments)]
fn row_group<T: Element>(
    args: &McscmArgs<'_, T>,
    by: usize,
    bx: usize,
    block: usize,
    nwf: usize,
    shared_row: &mut [i32],
    shared_val: &mut [T],
    alpha: T,
    beta: T,
) {
    let base = args.base.offset();

    // Lanes of one group share a column and run in lock-step; groups only
    // touch their own shared slots, so they are stepped one after another.
    for wid in 0..block / WF {
        let slots = wid * WF..(wid + 1) * WF;
        let mut col = (bx * block + wid * WF) / WF;

        while col < args.n {
            let col_start = (args.csc_col_ptr.load(col) - base) as usize;
            let col_end = (args.csc_col_ptr.load(col + 1) - base) as usize;
            let mut sum = [T::zero(); WF];

            let mut j = col_start;
            while j < col_end {
                for lid in 0..WF {
                    let k = j + lid;
                    let (r, v) = if k < col_end {
                        (args.csc_row_ind.load(k) - base, alpha * args.csc_val.load(k))
                    } else {
                        (0, T::zero())
                    };
                    shared_row[slots.start + lid] = r;
                    shared_val[slots.start + lid] = v;
                }

                let srow = &shared_row[slots.clone()];
                let sval = &shared_val[slots.clone()];
                for (lid, acc) in sum.iter_mut().enumerate() {
                    let row = lid + by * WF;
                    if row >= args.m {
                        continue;
                    }
                    for i in 0..WF {
                        let a = args.a.load(row + srow[i] as usize * args.lda);
                        *acc = T::fma(sval[i], a, *acc);
                    }
                }
                j += WF;
            }

            for (lid, &acc) in sum.iter().enumerate() {
                let row = lid + by * WF;
                if row >= args.m {
                    continue;
                }
                let idx = row + col * args.ldc;
                // SAFETY: (row, col) belongs to this lane of this group
                unsafe {
                    if beta == T::zero() {
                        args.c.store(idx, acc);
                    } else {
                        args.c.store(idx, T::fma(beta, args.c.load(idx), acc));
                    }
                }
            }
            col += nwf;
        }
    }
}
