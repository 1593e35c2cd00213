//! Sparse dot product kernels
//!
//! `doti` is a two-launch reduction. Part 1 runs [`DOTI_DIM`] blocks of
//! [`DOTI_DIM`] threads; every thread grid-strides over the nonzeros and each
//! block leaves one partial sum in the workspace. Part 2 is a single block
//! that folds the partials. Both launches use the same tree, so the result is
//! the same bit pattern on every run.

use super::launch::DOTI_DIM;
use super::reduce::block_reduce_sum;
use crate::dtype::Element;
use crate::runtime::simt::{BlockCtx, DeviceSlice, DeviceSliceMut, Kernel, LaunchConfig, launch_config};

/// Number of partial sums written by part 1
pub const DOTI_PARTIALS: usize = DOTI_DIM as usize;

/// Launch configuration of part 1
pub fn launch_doti_part1() -> LaunchConfig {
    launch_config(DOTI_DIM, DOTI_DIM, 0)
}

/// Launch configuration of part 2
pub fn launch_doti_part2() -> LaunchConfig {
    launch_config(1, DOTI_DIM, 0)
}

/// Part 1: per-block partial sums of `x_val[i] * y[x_ind[i] - base]`
pub struct DotiPart1<'a, T> {
    pub(crate) nnz: usize,
    pub(crate) x_val: DeviceSlice<'a, T>,
    pub(crate) x_ind: DeviceSlice<'a, i32>,
    pub(crate) y: DeviceSlice<'a, T>,
    pub(crate) workspace: DeviceSliceMut<'a, T>,
    pub(crate) base: i32,
}

impl<T: Element> Kernel for DotiPart1<'_, T> {
    const NAME: &'static str = "doti_kernel_part1";

    fn run_block(&self, ctx: &BlockCtx) {
        let bid = ctx.block_idx().x as usize;
        let block = ctx.block_dim().x as usize;
        let stride = ctx.grid_dim().x as usize * block;

        let mut sdata = ctx.shared::<T>(block);
        ctx.threads(|tid| {
            let mut sum = T::zero();
            let mut idx = bid * block + tid as usize;
            while idx < self.nnz {
                let col = (self.x_ind.load(idx) - self.base) as usize;
                sum = T::fma(self.y.load(col), self.x_val.load(idx), sum);
                idx += stride;
            }
            sdata[tid as usize] = sum;
        });

        block_reduce_sum(ctx, &mut sdata);

        ctx.threads(|tid| {
            if tid == 0 {
                // SAFETY: slot `bid` belongs to this block only
                unsafe { self.workspace.store(bid, sdata[0]) };
            }
        });
    }
}

/// Part 2: fold `nblocks` partials into `result[0]`
///
/// With `DEVICE_POINTER == false` the result is the workspace itself (slot 0)
/// and the caller copies it to the host afterwards.
pub struct DotiPart2<'a, T, const DEVICE_POINTER: bool> {
    pub(crate) nblocks: usize,
    pub(crate) workspace: DeviceSlice<'a, T>,
    pub(crate) result: DeviceSliceMut<'a, T>,
}

impl<T: Element, const DEVICE_POINTER: bool> Kernel for DotiPart2<'_, T, DEVICE_POINTER> {
    const NAME: &'static str = if DEVICE_POINTER {
        "doti_kernel_part2_device"
    } else {
        "doti_kernel_part2_host"
    };

    fn run_block(&self, ctx: &BlockCtx) {
        let block = ctx.block_dim().x as usize;

        let mut sdata = ctx.shared::<T>(block);
        ctx.threads(|tid| {
            let tid = tid as usize;
            sdata[tid] = if tid < self.nblocks {
                self.workspace.load(tid)
            } else {
                T::zero()
            };
        });

        block_reduce_sum(ctx, &mut sdata);

        ctx.threads(|tid| {
            if tid == 0 {
                // SAFETY: a single thread of a single block writes the result
                unsafe { self.result.store(0, sdata[0]) };
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::simt::Stream;

    #[test]
    fn test_two_pass_dot() {
        let stream = Stream::new();
        let nnz = 3000;
        let x_val: Vec<f64> = (0..nnz).map(|i| (i % 7) as f64).collect();
        let x_ind: Vec<i32> = (0..nnz as i32).map(|i| (i * 3) % 500).collect();
        let y: Vec<f64> = (0..500).map(|i| 1.0 + (i % 5) as f64).collect();
        let expected: f64 = (0..nnz)
            .map(|i| x_val[i] * y[x_ind[i] as usize])
            .sum();

        let mut workspace = vec![0.0f64; DOTI_PARTIALS];
        stream
            .launch(
                &launch_doti_part1(),
                &DotiPart1 {
                    nnz,
                    x_val: DeviceSlice::new(&x_val),
                    x_ind: DeviceSlice::new(&x_ind),
                    y: DeviceSlice::new(&y),
                    workspace: DeviceSliceMut::new(&mut workspace),
                    base: 0,
                },
            )
            .unwrap();

        let mut result = 0.0f64;
        stream
            .launch(
                &launch_doti_part2(),
                &DotiPart2::<_, true> {
                    nblocks: DOTI_PARTIALS,
                    workspace: DeviceSlice::new(&workspace),
                    result: DeviceSliceMut::scalar(&mut result),
                },
            )
            .unwrap();
        // Integer-valued products sum exactly
        assert_eq!(result, expected);
        assert_eq!(stream.launch_count(), 2);
    }

    #[test]
    fn test_kernel_names_differ_by_pointer_mode() {
        assert_ne!(
            <DotiPart2<'_, f32, true> as Kernel>::NAME,
            <DotiPart2<'_, f32, false> as Kernel>::NAME
        );
    }
}
